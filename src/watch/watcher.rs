//! File system watcher for branch reference changes

use notify::event::ModifyKind;
use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

/// Watch `git_dir` and send a tick whenever a reference changes
pub fn setup_watcher(git_dir: &Path, tx: mpsc::Sender<()>) -> io::Result<RecommendedWatcher> {
    let root: PathBuf = git_dir.to_path_buf();

    let mut watcher = RecommendedWatcher::new(
        move |res: Result<notify::Event, notify::Error>| {
            if let Ok(event) = res
                && should_process_event(&event, &root)
            {
                let _ = tx.send(());
            }
        },
        Config::default(),
    )
    .map_err(io::Error::other)?;

    watcher
        .watch(git_dir, RecursiveMode::Recursive)
        .map_err(io::Error::other)?;

    Ok(watcher)
}

/// Determine if a file system event should trigger a conflict refresh
fn should_process_event(event: &notify::Event, git_dir: &Path) -> bool {
    if !event.paths.iter().any(|path| is_ref_path(path, git_dir)) {
        return false;
    }

    // Filter for only actual content changes, not metadata
    matches!(
        event.kind,
        EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Name(_))
            | EventKind::Create(_)
            | EventKind::Remove(_)
    )
}

/// Whether `path` holds reference data: loose refs, packed refs, HEAD or FETCH_HEAD.
///
/// Lock files are ignored; git renames them into place when the update lands.
fn is_ref_path(path: &Path, git_dir: &Path) -> bool {
    let Ok(relative) = path.strip_prefix(git_dir) else {
        return false;
    };
    if relative.extension().is_some_and(|ext| ext == "lock") {
        return false;
    }

    relative.starts_with("refs")
        || relative == Path::new("packed-refs")
        || relative == Path::new("HEAD")
        || relative == Path::new("FETCH_HEAD")
}
