pub mod batch;
pub mod detect;
pub mod run;
pub mod validate;
