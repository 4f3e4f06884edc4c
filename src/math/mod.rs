pub mod collinearity;
pub mod logit;
