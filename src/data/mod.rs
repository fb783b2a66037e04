pub mod result;
pub mod value;

pub use result::{QueryResult, Record};
pub use value::Value;
