pub mod indexed;
pub mod path;

pub use indexed::{
    build_indexed_path, indexed_path_field_id, is_descendant_path, is_valid_field_id,
    parse_indexed_path, PathSegment, INDEXED_PATH_SEPARATOR,
};
pub use path::{is_link_or_tag, link_target, os_path_to_string, string_to_os_path, DocPath};
