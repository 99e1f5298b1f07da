//! On-disk project state: the per-project `sdd/sdd.json` config and the
//! `sdd/changes/<slug>/` change store. Both use atomic temp-file-then-rename
//! writes and an advisory file lock around mutations.

mod change;
mod fsutil;
mod project;

pub use change::{
    advance_stage, create, keyword_match, list, load as load_change, load_active, Change,
    ChangeStatus,
};
pub use fsutil::{atomic_write, with_write_lock};
pub use project::{find_project_root, load, save, sdd_dir, ProjectConfig};
