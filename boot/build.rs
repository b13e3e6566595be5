use std::path::{Path, PathBuf};
use bootloader::{BiosBoot, UefiBoot};

const KERNEL_BIN: &str = "hwinit";
const KERNEL_TARGET: &str = "x86_64-unknown-none";

fn kernel_path(workspace_root: &Path) -> PathBuf {
    let profile = std::env::var("HWINIT_PROFILE").unwrap_or_else(|_| "debug".into());
    workspace_root
        .join("target")
        .join(KERNEL_TARGET)
        .join(profile)
        .join(KERNEL_BIN)
}

fn main() {
    let workspace_root = PathBuf::from(std::env::var("CARGO_MANIFEST_DIR").unwrap())
        .parent()
        .unwrap()
        .to_path_buf();

    let kernel = kernel_path(&workspace_root);
    if !kernel.exists() {
        eprintln!("  [boot] kernel binary not found: {}", kernel.display());
        eprintln!("  [boot] build it first: cargo build -p hwinit --target {KERNEL_TARGET}");
        std::process::exit(1);
    }

    let bios_img = workspace_root.join(format!("{KERNEL_BIN}-bios.img"));
    eprintln!("  [boot] creating BIOS disk image {}", bios_img.display());
    BiosBoot::new(&kernel)
        .create_disk_image(&bios_img)
        .expect("failed to create BIOS disk image");

    let uefi_img = workspace_root.join(format!("{KERNEL_BIN}-uefi.img"));
    eprintln!("  [boot] creating UEFI disk image {}", uefi_img.display());
    UefiBoot::new(&kernel)
        .create_disk_image(&uefi_img)
        .expect("failed to create UEFI disk image");

    println!("cargo:rustc-env=HWINIT_BIOS_IMAGE={}", bios_img.display());
    println!("cargo:rustc-env=HWINIT_UEFI_IMAGE={}", uefi_img.display());
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=HWINIT_PROFILE");
    println!("cargo:rerun-if-changed={}", kernel.display());
}
