use std::io;

fn main() -> io::Result<()> {
    framewise::cli::run()
}
