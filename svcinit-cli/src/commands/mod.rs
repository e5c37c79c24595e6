pub mod credential;
pub mod run;
