pub mod authorized_keys;
pub mod path_validator;
pub mod shell;

pub use authorized_keys::{contains_key, count_keys, parse_key_line};
pub use path_validator::validate_hostname;
pub use shell::{cmd_quote, ps_quote, sh_quote};
