//! Agent payload selection
//!
//! Two static agent builds are embedded at build time (see `build.rs`). The orchestrator
//! reports a coarse CPU architecture string for the task; missing or unrecognized values
//! fall back to [`DEFAULT_ARCHITECTURE`] so a transfer never fails just because the
//! metadata is absent.

static AGENT_X86_64: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/agent-x86_64"));
static AGENT_AARCH64: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/agent-aarch64"));

/// CPU architecture of the task, as reported by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Architecture {
    X86_64,
    Arm64,
    /// Not reported, or a value we have no payload for
    Unknown(Option<String>),
}

/// Architecture used when the reported one is unknown
pub const DEFAULT_ARCHITECTURE: Architecture = Architecture::X86_64;

impl Architecture {
    pub fn from_reported(reported: Option<&str>) -> Self {
        let Some(value) = reported else {
            return Self::Unknown(None);
        };
        match value.trim().to_ascii_lowercase().as_str() {
            "x86_64" | "amd64" => Self::X86_64,
            "arm64" | "aarch64" => Self::Arm64,
            _ => Self::Unknown(Some(value.to_string())),
        }
    }
}

impl std::fmt::Display for Architecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::X86_64 => write!(f, "x86_64"),
            Self::Arm64 => write!(f, "arm64"),
            Self::Unknown(Some(value)) => write!(f, "unknown ({value})"),
            Self::Unknown(None) => write!(f, "unknown"),
        }
    }
}

/// Embedded agent binary for one architecture
#[derive(Clone, Copy)]
pub struct Payload {
    arch: &'static str,
    bytes: &'static [u8],
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Payload")
            .field("arch", &self.arch)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl Payload {
    /// Architecture name of this build
    pub fn arch(&self) -> &'static str {
        self.arch
    }

    pub fn bytes(&self) -> &'static [u8] {
        self.bytes
    }

    /// Fail if this build of taskcp was produced without the agent for this architecture
    pub fn ensure_bundled(&self) -> anyhow::Result<()> {
        if self.bytes.is_empty() {
            anyhow::bail!(
                "the {} agent was not bundled into this build of taskcp\n\
                \n\
                Rebuild with TASKCP_AGENT_X86_64 and TASKCP_AGENT_AARCH64 pointing at static\n\
                (musl) builds of taskcp-agent",
                self.arch
            );
        }
        Ok(())
    }
}

/// Choose the agent build for the task's architecture
pub fn select(arch: &Architecture) -> Payload {
    let resolved = match arch {
        Architecture::Unknown(reported) => {
            tracing::warn!(
                "unknown CPU architecture {:?}, using the {} agent",
                reported,
                DEFAULT_ARCHITECTURE
            );
            &DEFAULT_ARCHITECTURE
        }
        known => {
            tracing::debug!("{} architecture detected", known);
            known
        }
    };
    match resolved {
        Architecture::Arm64 => Payload {
            arch: "arm64",
            bytes: AGENT_AARCH64,
        },
        _ => Payload {
            arch: "x86_64",
            bytes: AGENT_X86_64,
        },
    }
}
