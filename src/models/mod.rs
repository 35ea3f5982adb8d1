// src/models/mod.rs

pub mod attempt;
pub mod ids;
pub mod question;
pub mod question_set;
pub mod taxonomy;
pub mod text;
pub mod user;

