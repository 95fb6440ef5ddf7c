pub mod error;
pub mod openai;
pub mod util;

pub use error::AiError;
pub use openai::OpenAi;
pub use util::{leading_number, strip_code_blocks, truncate_to_char_boundary};
