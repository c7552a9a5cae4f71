fn main() {
    std::process::exit(camcal::cli::main_with_args(std::env::args_os()));
}
