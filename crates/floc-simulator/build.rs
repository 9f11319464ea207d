//! Compile the LoRaWAN credentials into the simulator.
//!
//! Values come from the environment or a `.env` file. Missing values fall
//! back to all-zero credentials, which the simulated radio accepts.

const CREDENTIALS: [(&str, &str); 3] = [
    ("LORA_DEV_EUI", "0000000000000000"),
    ("LORA_APP_EUI", "0000000000000000"),
    ("LORA_APP_KEY", "00000000000000000000000000000000"),
];

fn main() {
    if let Ok(path) = dotenvy::dotenv() {
        println!("cargo:rerun-if-changed={}", path.display());
    }

    for (key, default) in CREDENTIALS {
        let value = std::env::var(key).unwrap_or_else(|_| default.to_string());
        println!("cargo:rustc-env={}={}", key, value);
        println!("cargo:rerun-if-env-changed={}", key);
    }
}
