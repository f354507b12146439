use std::{env, fs, path::PathBuf, process::Command};

fn main() {
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_EMBEDDED");

    // Without the embedded feature the object is loaded from a file at
    // runtime and no BPF toolchain is needed.
    if env::var_os("CARGO_FEATURE_EMBEDDED").is_none() {
        return;
    }

    // Location of the eBPF crate
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let ebpf_dir = manifest_dir.join("../scaled-ep-ebpf");

    // Determine build profile (debug/release)
    let profile = env::var("PROFILE").unwrap();

    // Build the eBPF crate for the bpfel-unknown-none target
    let mut cmd = Command::new("cargo");
    cmd.arg("+nightly")
        .arg("build")
        .arg("--target")
        .arg("bpfel-unknown-none")
        .arg("-Z")
        .arg("build-std=core");
    if profile == "release" {
        cmd.arg("--release");
    }
    // Cargo variables of this build must not leak into the nested one.
    cmd.env_remove("RUSTC")
        .env_remove("RUSTC_WORKSPACE_WRAPPER")
        .env_remove("CARGO_ENCODED_RUSTFLAGS");
    let status = cmd
        .current_dir(&ebpf_dir)
        .status()
        .expect("failed to build eBPF program");
    if !status.success() {
        panic!("eBPF build failed");
    }

    // Copy the resulting object file to OUT_DIR
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let profile_dir = if profile == "release" {
        "release"
    } else {
        "debug"
    };
    let src = ebpf_dir
        .join("target")
        .join("bpfel-unknown-none")
        .join(profile_dir)
        .join("scaled-ep");
    let dst = out_dir.join("scaled-ep");
    fs::create_dir_all(&out_dir).unwrap();
    fs::copy(&src, &dst).expect("failed to copy eBPF object");

    println!("cargo:rerun-if-changed={}", ebpf_dir.join("src").display());
    println!(
        "cargo:rerun-if-changed={}",
        manifest_dir.join("../scaled-ep-common/src").display()
    );
}
