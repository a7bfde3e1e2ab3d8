//! Reading and writing everything the histostack pipeline keeps on disk.

pub mod config;
pub mod dirs;
pub mod lists;
pub mod slice_io;
pub mod stack_io;
pub mod transform_io;
pub mod volume_io;

pub use config::{load_adjustments, load_config, PipelineConfig, Roi, WHOLE_HEART_ROI};
pub use dirs::{clear_dir, ensure_dir, Dirs};
pub use lists::{construct_paths, directory_contents, read_basenames, save_vector_to_files};
pub use slice_io::{read_slice, read_slices, write_slice};
pub use stack_io::{
    load_number_of_times_too_big, load_stack_transforms, read_stack, save_number_of_times_too_big,
    save_stack_transforms, write_stack_volumes, Resolution,
};
pub use transform_io::{read_rigid3d, read_transform, write_rigid3d, write_transform};
pub use volume_io::{read_mri, read_volume, write_volume};
