pub mod prelude;

pub mod classification;
pub mod correction;
pub mod run;
