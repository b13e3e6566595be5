//! Prints the disk images produced by the build script, ready for QEMU.

fn main() {
    let bios = env!("HWINIT_BIOS_IMAGE");
    let uefi = env!("HWINIT_UEFI_IMAGE");
    println!("BIOS image: {bios}");
    println!("UEFI image: {uefi}");
    println!("run: qemu-system-x86_64 -drive format=raw,file={bios} -serial stdio");
}
