//! Sparsity modes and transpose flags.
//!
//! A [`SparsityMode`] names, for one kernel call, which of the three matrices
//! involved are block-sparse. Positions are fixed: `(left, right, output)`.
//! The textual form is one character per position, `d` for dense and `s` for
//! sparse, so `"sdd"` is a sparse left operand times a dense right operand
//! producing a dense output.

use core::fmt;
use core::str::FromStr;

use briny::traits::{InteriorImmutable, RawConvert, StableLayout, Unaligned};

use crate::error::Error;

/// Position of the left operand in a mode triple.
pub const LEFT: usize = 0;
/// Position of the right operand in a mode triple.
pub const RIGHT: usize = 1;
/// Position of the output in a mode triple.
pub const OUTPUT: usize = 2;

/// Storage kind of one matrix in a multiply.
///
/// Byte-stable so a mode can be passed to native kernels as three raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Sparsity {
    #[default]
    Dense = 0,
    Sparse = 1,
}

unsafe impl StableLayout for Sparsity {}
unsafe impl RawConvert for Sparsity {}
unsafe impl Unaligned for Sparsity {}
unsafe impl InteriorImmutable for Sparsity {}

impl Sparsity {
    pub const fn symbol(self) -> char {
        match self {
            Self::Dense => 'd',
            Self::Sparse => 's',
        }
    }

    pub const fn from_symbol(c: char) -> Option<Self> {
        match c {
            'd' => Some(Self::Dense),
            's' => Some(Self::Sparse),
            _ => None,
        }
    }

    pub const fn is_sparse(self) -> bool {
        matches!(self, Self::Sparse)
    }
}

impl TryFrom<u8> for Sparsity {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Dense),
            1 => Ok(Self::Sparse),
            _ => Err(()),
        }
    }
}

/// Ordered `(left, right, output)` sparsity triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SparsityMode([Sparsity; 3]);

impl SparsityMode {
    pub const fn new(left: Sparsity, right: Sparsity, output: Sparsity) -> Self {
        Self([left, right, output])
    }

    pub const fn left(self) -> Sparsity {
        self.0[LEFT]
    }

    pub const fn right(self) -> Sparsity {
        self.0[RIGHT]
    }

    pub const fn output(self) -> Sparsity {
        self.0[OUTPUT]
    }

    pub const fn symbols(self) -> [Sparsity; 3] {
        self.0
    }

    pub const fn get(self, position: usize) -> Sparsity {
        self.0[position]
    }

    /// Whether any position is sparse, i.e. whether a layout is needed.
    pub const fn any_sparse(self) -> bool {
        self.0[0].is_sparse() || self.0[1].is_sparse() || self.0[2].is_sparse()
    }

    pub fn sparse_count(self) -> usize {
        self.0.iter().filter(|s| s.is_sparse()).count()
    }

    /// Builds a new triple whose position `i` holds `self[order[i]]`.
    pub const fn permute(self, order: [usize; 3]) -> Self {
        Self([self.0[order[0]], self.0[order[1]], self.0[order[2]]])
    }

    /// Every triple over `{dense, sparse}`, in `ddd, ..., sss` order.
    pub fn all() -> impl Iterator<Item = Self> {
        (0u8..8).map(|bits| {
            let at = |shift: u8| {
                if bits & (4 >> shift) != 0 {
                    Sparsity::Sparse
                } else {
                    Sparsity::Dense
                }
            };
            Self([at(0), at(1), at(2)])
        })
    }
}

impl fmt::Display for SparsityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for s in self.0 {
            write!(f, "{}", s.symbol())?;
        }
        Ok(())
    }
}

impl FromStr for SparsityMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let symbols = s
            .chars()
            .map(|c| {
                Sparsity::from_symbol(c).ok_or_else(|| {
                    Error::InvalidMode(format!("`{s}`: symbol {c:?} is not one of 'd' or 's'"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::try_from(symbols.as_slice())
            .map_err(|_| Error::InvalidMode(format!("`{s}`: expected 3 symbols, got {}", symbols.len())))
    }
}

impl TryFrom<&[Sparsity]> for SparsityMode {
    type Error = Error;

    fn try_from(symbols: &[Sparsity]) -> Result<Self, Self::Error> {
        <[Sparsity; 3]>::try_from(symbols)
            .map(Self)
            .map_err(|_| Error::InvalidMode(format!("expected 3 symbols, got {}", symbols.len())))
    }
}

impl From<[Sparsity; 3]> for SparsityMode {
    fn from(symbols: [Sparsity; 3]) -> Self {
        Self(symbols)
    }
}

/// Logical transpose flags for the left (`a`) and right (`b`) operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TransposeFlags {
    pub a: bool,
    pub b: bool,
}

impl TransposeFlags {
    pub const NONE: Self = Self::new(false, false);

    pub const fn new(a: bool, b: bool) -> Self {
        Self { a, b }
    }

    /// The four flag combinations, `(false, false)` first.
    pub const fn all() -> [Self; 4] {
        [
            Self::new(false, false),
            Self::new(false, true),
            Self::new(true, false),
            Self::new(true, true),
        ]
    }
}
