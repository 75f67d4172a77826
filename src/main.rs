fn main() {
    toolwire::cli::main();
}
