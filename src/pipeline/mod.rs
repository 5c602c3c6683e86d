pub mod corpus;
pub mod extraction;
