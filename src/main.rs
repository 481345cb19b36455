#![allow(non_snake_case)]
use dae_reduce::Examples::thermodynamics_examples::thermodynamics_examples;

fn main() {
    // 0 mass conservation, 1 energy conservation, 2 heat and work, 3 flow system
    let example = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse::<usize>().ok())
        .unwrap_or(0);
    thermodynamics_examples(example);
}
