pub mod filesystem;
pub mod symlink;

pub use filesystem::{backup_copy, ensure_directory, move_path, read_file, remove_path, write_file};
pub use symlink::{is_symlink, path_exists, symlink_points_to, NativeSymlinks, SymlinkCreator};
