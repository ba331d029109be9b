//! Register Classes and Temporaries
//!
//! Every virtual register ("temporary") carries a register class describing
//! how many register slots it occupies and which register file it lives in.
//! A slot is one 32-bit register; subword classes are measured in bytes.

use std::fmt;

/// Register file of a temporary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegType {
    /// Wave-uniform scalar registers
    Sgpr,
    /// Per-lane vector registers
    Vgpr,
}

/// Which of the two control flow graphs governs a value.
///
/// Wave-uniform values (and linear vgprs) flow along the linear CFG, which
/// contains the divergence-management blocks. Everything else follows the
/// logical CFG that mirrors structured source control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CfgDomain {
    Logical,
    Linear,
}

/// Register class: register file, size and layout flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegClass {
    ty: RegType,
    /// Size in slots, or in bytes for subword classes
    size: u8,
    subdword: bool,
    linear_vgpr: bool,
}

impl RegClass {
    pub const S1: RegClass = RegClass::new(RegType::Sgpr, 1);
    pub const S2: RegClass = RegClass::new(RegType::Sgpr, 2);
    pub const S4: RegClass = RegClass::new(RegType::Sgpr, 4);
    pub const V1: RegClass = RegClass::new(RegType::Vgpr, 1);
    pub const V2: RegClass = RegClass::new(RegType::Vgpr, 2);
    pub const V3: RegClass = RegClass::new(RegType::Vgpr, 3);
    pub const V4: RegClass = RegClass::new(RegType::Vgpr, 4);
    pub const V1B: RegClass = RegClass::subdword(1);
    pub const V2B: RegClass = RegClass::subdword(2);

    /// Create a slot-granular register class.
    pub const fn new(ty: RegType, slots: u8) -> Self {
        Self {
            ty,
            size: slots,
            subdword: false,
            linear_vgpr: false,
        }
    }

    /// Create a vgpr class measured in bytes.
    pub const fn subdword(bytes: u8) -> Self {
        Self {
            ty: RegType::Vgpr,
            size: bytes,
            subdword: true,
            linear_vgpr: false,
        }
    }

    /// Mark a vgpr class as linear (live across divergent control flow).
    pub const fn as_linear(self) -> Self {
        Self {
            linear_vgpr: matches!(self.ty, RegType::Vgpr),
            ..self
        }
    }

    pub fn ty(&self) -> RegType {
        self.ty
    }

    /// Size in slots (subword classes round up).
    pub fn size(&self) -> u32 {
        if self.subdword {
            (self.size as u32 + 3) / 4
        } else {
            self.size as u32
        }
    }

    pub fn bytes(&self) -> u32 {
        if self.subdword {
            self.size as u32
        } else {
            self.size as u32 * 4
        }
    }

    pub fn is_subdword(&self) -> bool {
        self.subdword
    }

    pub fn is_linear_vgpr(&self) -> bool {
        self.linear_vgpr
    }

    /// True for classes whose values follow the linear CFG.
    pub fn is_linear(&self) -> bool {
        self.ty == RegType::Sgpr || self.linear_vgpr
    }

    pub fn domain(&self) -> CfgDomain {
        if self.is_linear() {
            CfgDomain::Linear
        } else {
            CfgDomain::Logical
        }
    }

    /// The one-slot class of the same register file, keeping the linear flag.
    pub fn elem(&self) -> RegClass {
        let elem = RegClass::new(self.ty, 1);
        if self.linear_vgpr {
            elem.as_linear()
        } else {
            elem
        }
    }

    /// A class of the same register file and linearity with `slots` slots.
    pub fn resized(&self, slots: u8) -> RegClass {
        let rc = RegClass::new(self.ty, slots);
        if self.linear_vgpr {
            rc.as_linear()
        } else {
            rc
        }
    }
}

impl fmt::Display for RegClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.linear_vgpr {
            write!(f, "l")?;
        }
        let file = match self.ty {
            RegType::Sgpr => 's',
            RegType::Vgpr => 'v',
        };
        if self.subdword {
            write!(f, "{}{}b", file, self.size)
        } else {
            write!(f, "{}{}", file, self.size)
        }
    }
}

/// Unique identifier of a temporary. Id 0 is reserved and never allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TempId(pub u32);

impl TempId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for TempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// A temporary together with its register class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Temp {
    pub id: TempId,
    pub rc: RegClass,
}

impl Temp {
    pub fn new(id: TempId, rc: RegClass) -> Self {
        Self { id, rc }
    }

    pub fn size(&self) -> u32 {
        self.rc.size()
    }
}

impl fmt::Display for Temp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.id, self.rc)
    }
}

/// A physical register, addressed in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PhysReg(pub u32);

impl PhysReg {
    /// Register number `reg` (slot granular).
    pub fn new(reg: u32) -> Self {
        Self(reg * 4)
    }

    pub fn reg(&self) -> u32 {
        self.0 / 4
    }

    pub fn byte(&self) -> u32 {
        self.0 % 4
    }

    pub fn advance(&self, bytes: u32) -> PhysReg {
        PhysReg(self.0 + bytes)
    }
}

impl fmt::Display for PhysReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.byte() != 0 {
            write!(f, "r{}.b{}", self.reg(), self.byte())
        } else {
            write!(f, "r{}", self.reg())
        }
    }
}
