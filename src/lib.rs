//! Provisioning of single user accounts in a relational store.

pub mod config;
pub mod db;
pub mod users;
