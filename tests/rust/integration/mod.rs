//! Integration tests - full graph cache pipeline over the in-process store
//!
//! These tests run report sources through rebuild, publish and projection the
//! way the binary does, with `MemoryStore` standing in for ClickHouse.

mod common;

mod cache_lifecycle_tests;
mod graph_pipeline_tests;
mod report_definition_tests;
