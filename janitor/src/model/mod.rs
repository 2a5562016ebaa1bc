pub mod category;
pub mod classification;
pub mod correction;
pub mod run;

pub use category::EmailCategory;
