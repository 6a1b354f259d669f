use std::path::{Path, PathBuf};

fn main() {
    // Host builds (unit tests) have no ESP-IDF environment to forward.
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("espidf") {
        embuild::espidf::sysenv::output();
    }

    if std::env::var("CARGO_FEATURE_TFLITE_MODEL").is_ok() {
        // Typically: .embuild/espressif/tools/riscv32-esp-elf/esp-<VER>/riscv32-esp-elf/bin/riscv32-esp-elf-g++
        let compiler = find_compiler().unwrap_or_else(|| "riscv32-esp-elf-g++".into());
        build_model(&compiler);
    }
}

fn find_compiler() -> Option<PathBuf> {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").ok()?;

    // Check local .embuild first, then global ~/.espressif
    let search_dirs = [
        PathBuf::from(manifest_dir).join(".embuild"),
        dirs::home_dir().map(|h| h.join(".espressif")).unwrap_or_default(),
    ];

    for root in search_dirs {
        let tools_dir = root.join("espressif/tools/riscv32-esp-elf");
        let Ok(entries) = std::fs::read_dir(&tools_dir) else {
            continue;
        };
        // Versioned directory, e.g. esp-13.2.0_20240530
        for entry in entries.flatten() {
            let candidate = entry.path().join("riscv32-esp-elf/bin/riscv32-esp-elf-g++");
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }
    None
}

/// Compile the exported TensorFlow Lite Micro model together with the thin C
/// wrapper exposing `handshake_model_invoke`.
fn build_model(compiler_path: &Path) {
    let model_root = PathBuf::from("handshake_model");

    let mut build = cc::Build::new();
    build
        .cpp(true)
        .compiler(compiler_path)
        .flag("-std=c++17")
        .flag("-O3")
        .define("TF_LITE_STATIC_MEMORY", None)
        .define("TF_LITE_DISABLE_X86_NEON", None)
        .include(&model_root)
        .include(model_root.join("tflite-micro"))
        .include(model_root.join("tflite-micro/third_party/flatbuffers/include"))
        .include(model_root.join("tflite-micro/third_party/gemmlowp"));

    add_source_files(&mut build, &model_root);

    build.compile("handshake-model");

    println!("cargo:rerun-if-changed=handshake_model");
}

fn add_source_files(build: &mut cc::Build, dir: &Path) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        println!("cargo:warning=model sources not found in {}", dir.display());
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            // Kernel test harnesses would pull in a second `main`.
            if path.file_name().is_some_and(|n| n == "testing") {
                continue;
            }
            add_source_files(build, &path);
        } else if let Some(ext) = path.extension() {
            if ext == "c" || ext == "cpp" || ext == "cc" {
                build.file(&path);
            }
        }
    }
}
