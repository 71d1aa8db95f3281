use crate::types::ScalarType;

// --- Buffers ---

/// A dense, row-major buffer declared at module level.
///
/// Declared buffers get a generated constructor (`<name>_create`) in the
/// native module; functions receive buffers as data pointers through
/// [`ParamKind::Buffer`] parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buffer {
    pub name: String,
    pub dtype: ScalarType,
    /// Extent of every dimension. An empty shape is a scalar buffer of one element.
    pub shape: Vec<usize>,
}

impl Buffer {
    pub fn new(name: impl Into<String>, dtype: ScalarType, shape: impl Into<Vec<usize>>) -> Self {
        Self { name: name.into(), dtype, shape: shape.into() }
    }

    /// Number of elements, or `None` if it overflows `usize`. Scalar buffers hold exactly one.
    pub fn numel(&self) -> Option<usize> {
        self.shape.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
    }

    pub fn size_bytes(&self) -> Option<usize> {
        self.numel()?.checked_mul(self.dtype.size_bytes())
    }

    /// Symbol of the constructor emitted for this buffer.
    pub fn constructor_name(&self) -> String {
        format!("{}_create", self.name)
    }
}

// --- Functions ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Passed by value.
    Scalar(ScalarType),
    /// Passed as a pointer to the first element.
    Buffer(ScalarType),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
}

impl Param {
    pub fn scalar(name: impl Into<String>, ty: ScalarType) -> Self {
        Self { name: name.into(), kind: ParamKind::Scalar(ty) }
    }

    pub fn buffer(name: impl Into<String>, dtype: ScalarType) -> Self {
        Self { name: name.into(), kind: ParamKind::Buffer(dtype) }
    }
}

/// A lowered function: a straight-line sequence of statements and loop nests.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    /// `None` for functions that only write through buffer parameters.
    pub ret: Option<ScalarType>,
    pub body: Vec<Stmt>,
}

// --- Expressions and statements ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    IntImm { value: i64, ty: ScalarType },
    FloatImm { value: f64, ty: ScalarType },
    /// A scalar parameter, a `Let` binding or a loop variable.
    Var(String),
    /// Element `index` (flat, row-major) of a buffer parameter.
    Load { buffer: String, index: Box<Expr> },
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
    /// `if lhs <cmp> rhs { then } else { otherwise }`, evaluated without branching.
    Select {
        cmp: CmpOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Cast { value: Box<Expr>, to: ScalarType },
    /// Call to a symbol outside the module: a runtime kernel or a host library export.
    Call { callee: String, args: Vec<Expr>, ret: ScalarType },
}

impl Expr {
    pub fn int(value: i64) -> Self {
        Expr::IntImm { value, ty: ScalarType::I64 }
    }

    pub fn i32(value: i32) -> Self {
        Expr::IntImm { value: value as i64, ty: ScalarType::I32 }
    }

    pub fn f32(value: f32) -> Self {
        Expr::FloatImm { value: value as f64, ty: ScalarType::F32 }
    }

    pub fn f64(value: f64) -> Self {
        Expr::FloatImm { value, ty: ScalarType::F64 }
    }

    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var(name.into())
    }

    pub fn load(buffer: impl Into<String>, index: Expr) -> Self {
        Expr::Load { buffer: buffer.into(), index: Box::new(index) }
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }
    }

    pub fn add(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Add, lhs, rhs)
    }

    pub fn mul(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Mul, lhs, rhs)
    }

    pub fn cast(value: Expr, to: ScalarType) -> Self {
        Expr::Cast { value: Box::new(value), to }
    }

    pub fn call(callee: impl Into<String>, args: Vec<Expr>, ret: ScalarType) -> Self {
        Expr::Call { callee: callee.into(), args, ret }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// Introduce a new variable.
    Let { var: String, value: Expr },
    /// Overwrite an existing variable (reductions).
    Assign { var: String, value: Expr },
    Store { buffer: String, index: Expr, value: Expr },
    /// `for var in 0..extent { body }` with an `i64` induction variable.
    For { var: String, extent: Expr, body: Vec<Stmt> },
    /// Evaluate for side effects, typically an extern call.
    Eval(Expr),
    Return(Expr),
}

// --- Module ---

/// A finished, lowerable module.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    /// Module identifier; also the key of the compiled-object cache.
    pub name: String,
    pub buffers: Vec<Buffer>,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), buffers: Vec::new(), functions: Vec::new() }
    }
}
