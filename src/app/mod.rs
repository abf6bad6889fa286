pub mod api;
pub mod config;
pub mod error;
pub mod generator;
pub mod models;
pub mod service;
pub mod storage;
pub mod supabase;
pub mod task_edit;
pub mod task_list;
pub mod ui;
