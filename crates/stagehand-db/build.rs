fn main() {
    // Rebuild when the embedded migrations change
    println!("cargo:rerun-if-changed=migrations/");
}
