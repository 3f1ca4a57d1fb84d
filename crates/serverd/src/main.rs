fn main() {
    libserverd::entrypoints::run_daemon();
}
