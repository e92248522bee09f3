// ABOUTME: emits a json schema for the shellgate request protocol to stdout.
// ABOUTME: lets agent runtimes constrain tool-call payloads to what the daemon accepts.

fn main() {
    let schema = schemars::schema_for!(shellgate_common::Request);
    let json = serde_json::to_string_pretty(&schema).expect("serialize schema");
    println!("{json}");
}
