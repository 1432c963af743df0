//! # Voxel Engine Core Entry Point
//!
//! Runs the headless engine demo. Set `RUST_LOG` to see the frame and upload traffic, and
//! `VOXEL_ENGINE_CONFIG` to point at a JSON config file.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=debug cargo run --release
//! ```

fn main() {
    voxel_engine_core::run();
}
