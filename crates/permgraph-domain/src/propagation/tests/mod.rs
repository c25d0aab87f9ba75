//! Tests for the propagation engine.
//!
//! Organized by functionality:
//! - Pure traversal (narrowing, union, cycles)
//! - Lazy graph loading from an edge reader
//! - Property-based checks
