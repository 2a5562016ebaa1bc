pub use super::classification::Entity as Classification;
pub use super::correction::Entity as Correction;
pub use super::run::Entity as Run;
