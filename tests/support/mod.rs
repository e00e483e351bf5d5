#![allow(dead_code)]

pub mod animegan_env;
pub mod images;
