// Build script helper shared by every workspace crate.
// Include it from build.rs with: include!("../build_common.rs");
//
// The including file must import std::env, std::fs and std::path::Path.

/// Copy the crate README into `OUT_DIR/README_GENERATED.md` for `#![doc]`.
///
/// Links into `src/` are rewritten to module paths (`](src/engine.rs)` becomes
/// `](engine)`) so rustdoc resolves them. A crate without a README gets an
/// empty file.
fn process_readme_for_rustdoc(crate_dir: &str) {
    println!("cargo:rerun-if-changed=README.md");

    let out_dir = env::var("OUT_DIR").expect("cargo sets OUT_DIR for build scripts");
    let dest_path = Path::new(&out_dir).join("README_GENERATED.md");

    let content = fs::read_to_string(Path::new(crate_dir).join("README.md")).unwrap_or_default();
    let rustdoc_content = content.replace("](src/", "](").replace(".rs)", ")");

    fs::write(dest_path, rustdoc_content).expect("OUT_DIR is writable");
}
