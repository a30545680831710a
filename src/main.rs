//! Money Pot Lab
//!
//! Protocol core for password-gated escrow pots: a creator locks funds and
//! registers a one-character password; hunters prove knowledge of it through
//! randomized color-partition challenges scored against a session legend.

fn main() {
    println!("Money Pot Lab");
    println!("=============");
    println!();
    println!("Run the verifier service:");
    println!("  cargo run --bin api");
    println!();
    println!("Run the protocol test suite:");
    println!("  cargo test");
}
