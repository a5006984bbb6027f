use std::{env, path::PathBuf};

fn main() {
    let arch = env::var("CARGO_CFG_TARGET_ARCH").expect("CARGO_CFG_TARGET_ARCH not set");
    let os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();

    let manifest_dir = env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR not set");
    let kernel_dir = PathBuf::from(manifest_dir);

    // The interrupt stubs and the ring-transition trampoline are assembly;
    // they only exist on the bare-metal i686 build. Host builds (cargo test
    // on the build machine) compile the portable subsystems only.
    if arch == "x86" && os == "none" {
        cc::Build::new()
            .file("src/arch/x86/trampoline.s")
            .flag("-m32")
            .compile("trampoline");
        println!("cargo:rerun-if-changed=src/arch/x86/trampoline.s");

        let linker_script = kernel_dir.join("src/arch/x86/link.ld");
        println!("cargo:rustc-link-arg=-T{}", linker_script.display());
        println!("cargo:rerun-if-changed=src/arch/x86/link.ld");
    }
}
