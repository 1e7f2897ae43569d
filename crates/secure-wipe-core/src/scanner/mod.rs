pub mod walk;

pub use walk::{DeletionTarget, EntryKind, FilesystemEntry};
