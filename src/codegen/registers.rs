use crate::error::{CompileError, Result};

/// General-purpose registers handed out to expression results. Scratch
/// registers come first; rcx, rdx and rax sit at the back because division
/// and the msvcrt calls clobber them.
const GENERAL: [&str; 14] = [
    "rbx", "rsi", "rdi", "r10", "r11", "r12", "r13", "r14", "r15", "r8", "r9", "rcx", "rdx", "rax",
];

const XMM: [&str; 16] = [
    "xmm0", "xmm1", "xmm2", "xmm3", "xmm4", "xmm5", "xmm6", "xmm7", "xmm8", "xmm9", "xmm10",
    "xmm11", "xmm12", "xmm13", "xmm14", "xmm15",
];

/// Two disjoint free lists, one per register file. A register held by a
/// live `GenResult` is absent from its list until released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterManager {
    general: Vec<&'static str>,
    xmm: Vec<&'static str>,
}

impl Default for RegisterManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterManager {
    pub fn new() -> Self {
        Self {
            general: GENERAL.to_vec(),
            xmm: XMM.to_vec(),
        }
    }

    /// Takes any free general-purpose register out of the pool.
    pub fn get_free(&mut self) -> Result<String> {
        if self.general.is_empty() {
            return Err(CompileError::runtime(
                "expression too complex, no general purpose register left",
                -1,
            ));
        }
        Ok(self.general.remove(0).to_owned())
    }

    /// Takes any free XMM register out of the pool.
    pub fn get_free_xmm(&mut self) -> Result<String> {
        if self.xmm.is_empty() {
            return Err(CompileError::runtime(
                "expression too complex, no xmm register left",
                -1,
            ));
        }
        Ok(self.xmm.remove(0).to_owned())
    }

    /// Returns a register to the front of its pool, routing on the `xmm`
    /// prefix. Handing the most recently released register out first keeps
    /// the emitted names stable from statement to statement. Empty names
    /// (void results) and double releases are ignored.
    pub fn release(&mut self, name: &str) {
        if name.is_empty() {
            return;
        }
        if name.starts_with("xmm") {
            if let Some(register) = XMM.iter().find(|r| **r == name) {
                if !self.xmm.contains(register) {
                    self.xmm.insert(0, register);
                }
            }
        } else if let Some(register) = GENERAL.iter().find(|r| **r == name) {
            if !self.general.contains(register) {
                self.general.insert(0, register);
            }
        }
    }

    /// (general, xmm) free list sizes, for balance checks.
    pub fn free_counts(&self) -> (usize, usize) {
        (self.general.len(), self.xmm.len())
    }
}

/// 32-bit alias of a 64-bit general-purpose register.
pub(super) fn reg32(name: &str) -> String {
    match name {
        "rax" => "eax".to_owned(),
        "rbx" => "ebx".to_owned(),
        "rcx" => "ecx".to_owned(),
        "rdx" => "edx".to_owned(),
        "rsi" => "esi".to_owned(),
        "rdi" => "edi".to_owned(),
        _ => format!("{name}d"),
    }
}

/// Low-byte alias of a 64-bit general-purpose register.
pub(super) fn reg8(name: &str) -> String {
    match name {
        "rax" => "al".to_owned(),
        "rbx" => "bl".to_owned(),
        "rcx" => "cl".to_owned(),
        "rdx" => "dl".to_owned(),
        "rsi" => "sil".to_owned(),
        "rdi" => "dil".to_owned(),
        _ => format!("{name}b"),
    }
}
