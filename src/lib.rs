pub mod challenge;

pub mod config;

pub mod controller;

pub mod market;

pub mod test_helpers;
