use std::path::Path;

// Static agent builds are embedded into the library. Point these variables at the musl
// builds of `taskcp-agent`, e.g.
//   TASKCP_AGENT_X86_64=target/x86_64-unknown-linux-musl/release/taskcp-agent
const PAYLOADS: [(&str, &str); 2] = [
    ("TASKCP_AGENT_X86_64", "agent-x86_64"),
    ("TASKCP_AGENT_AARCH64", "agent-aarch64"),
];

fn main() {
    let out_dir = std::env::var("OUT_DIR").expect("OUT_DIR is set by cargo");
    for (var, name) in PAYLOADS {
        println!("cargo:rerun-if-env-changed={var}");
        let dest = Path::new(&out_dir).join(name);
        match std::env::var(var) {
            Ok(src) if !src.is_empty() => {
                println!("cargo:rerun-if-changed={src}");
                if let Err(error) = std::fs::copy(&src, &dest) {
                    panic!("failed to copy agent payload {var} from {src}: {error}");
                }
            }
            _ => {
                // empty payload, taskcp refuses to bootstrap with it at runtime
                println!("cargo:warning={var} is not set, the {name} payload will not be bundled");
                std::fs::write(&dest, b"").expect("failed to write empty agent payload");
            }
        }
    }
}
