//! Generates the `seqlease` gRPC client and server bindings from
//! `proto/seqlease.proto`, plus an encoded file descriptor set for server
//! reflection at `$OUT_DIR/seqlease_descriptor.bin`.
//!
//! The generated code is included by `seqlease_tonic_core::proto`.
use std::env;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let out_dir = PathBuf::from(env::var("OUT_DIR")?);
    let descriptor_path = out_dir.join("seqlease_descriptor.bin");

    let mut config = tonic_prost_build::Config::new();
    config.file_descriptor_set_path(&descriptor_path);

    tonic_prost_build::configure().compile_with_config(
        config,
        &["proto/seqlease.proto"],
        &["proto"],
    )?;

    println!("cargo:rerun-if-changed=proto/seqlease.proto");
    Ok(())
}
