pub fn show() {
    println!("huddle {}", env!("CARGO_PKG_VERSION"));
}
