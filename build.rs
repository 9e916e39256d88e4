fn main() {
    // Expose the full target triple so the result envelope can report the
    // host it ran on.
    println!(
        "cargo:rustc-env=TARGET={}",
        std::env::var("TARGET").expect("cargo sets TARGET")
    );
}
