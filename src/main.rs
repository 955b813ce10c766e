fn main() {
    vagabond::signals::trap_early_interrupts();
    let code = vagabond::run_cli();
    if code != 0 {
        std::process::exit(code);
    }
}
