#![cfg(test)]

#[macro_use]
pub mod common;

pub mod backend_tests;
