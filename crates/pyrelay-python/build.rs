use std::env;
use std::path::{Path, PathBuf};

// Links against a bundled libpython when PYRELAY_PYTHON_SHIM_DIR points at one,
// so hosts can ship the embedded engine next to the binary.
fn main() {
    println!("cargo:rerun-if-env-changed=PYRELAY_PYTHON_SHIM_DIR");
    println!("cargo:rerun-if-env-changed=PYO3_PYTHON");

    let Ok(shim_dir) = env::var("PYRELAY_PYTHON_SHIM_DIR").map(PathBuf::from) else {
        return;
    };
    if !shim_dir.exists() {
        return;
    }

    let target = env::var("TARGET").expect("TARGET not set");

    if let Some(lib_file) = find_python_lib(&shim_dir) {
        println!("cargo:rustc-link-search=native={}", shim_dir.display());
        println!("cargo:rerun-if-changed={}", lib_file.display());
        copy_to_profile_dir(&lib_file);
        add_rpath(&target);
    }
}

fn find_python_lib(dir: &Path) -> Option<PathBuf> {
    let entries = dir.read_dir().ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|s| s.to_str()) {
            if name.starts_with("libpython") && (name.ends_with(".dylib") || name.contains(".so"))
            {
                return Some(path);
            }
            if name.starts_with("python") && name.ends_with(".dll") {
                return Some(path);
            }
        }
    }
    None
}

fn add_rpath(target: &str) {
    if target.contains("apple-darwin") {
        println!("cargo:rustc-link-arg=-Wl,-rpath,@executable_path");
        println!("cargo:rustc-link-arg=-Wl,-rpath,@executable_path/..");
    } else if target.contains("linux") {
        println!("cargo:rustc-link-arg=-Wl,-rpath,$ORIGIN");
        println!("cargo:rustc-link-arg=-Wl,-rpath,$ORIGIN/..");
    }
}

fn copy_to_profile_dir(lib_file: &Path) {
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR not set"));
    let profile_dir = out_dir
        .ancestors()
        .nth(3)
        .expect("failed to resolve profile dir (target/<profile>)");
    let file_name = lib_file
        .file_name()
        .expect("library file should have a name");
    let dest = profile_dir.join(file_name);
    std::fs::create_dir_all(profile_dir).expect("failed to create profile dir");
    if let Err(err) = std::fs::copy(lib_file, &dest) {
        panic!("failed to copy python shim to {}: {}", dest.display(), err);
    }
}
