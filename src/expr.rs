/* itsyld expression model
 *
 * node types for the script language's arithmetic, relational and
 * ternary expressions, plus the linker-specific built-in functions.
 * the grammar builds these trees and the address-assignment pass,
 * which lives outside this crate, evaluates them. nodes are immutable
 * once built and owned by the statement that references them.
 *
 * (c) Chris Williams, 2021.
 *
 * See LICENSE for usage and copying.
 */

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum UnaryOp
{
    Negate,
    LogicalNot,
    BitwiseNot
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BinaryOp
{
    Multiply,
    Divide,
    Modulo,
    Add,
    Subtract,
    ShiftLeft,
    ShiftRight,
    Less,
    Greater,
    LessEq,
    GreaterEq,
    Eq,
    NotEq,
    BitwiseAnd,
    BitwiseXor,
    BitwiseOr,
    LogicalAnd,
    LogicalOr
}

/* the operator tag carried by an assignment statement. assignments are
   statements, not expression operators: the grammar accepts exactly one
   per statement terminator */
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AssignOp
{
    Set,        /* =   */
    Add,        /* +=  */
    Subtract,   /* -=  */
    Multiply,   /* *=  */
    Divide,     /* /=  */
    ShiftLeft,  /* <<= */
    ShiftRight, /* >>= */
    And,        /* &=  */
    Or          /* |=  */
}

/* the built-in functions the expression language understands. the
   evaluator gives these meaning; here they are just spellings */
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Builtin
{
    Align,
    Addr,
    LoadAddr,
    SizeOf,
    SizeOfHeaders,
    Origin,
    Length,
    Defined,
    Max,
    Min,
    Absolute,
    Block,
    Next,
    SegmentStart,
    DataSegmentAlign,
    DataSegmentRelroEnd,
    DataSegmentEnd,
    Assert
}

impl Builtin
{
    /* map a keyword spelling to a built-in, or None for plain symbols */
    pub fn from_name(name: &str) -> Option<Builtin>
    {
        match name
        {
            "ALIGN"                  => Some(Builtin::Align),
            "ADDR"                   => Some(Builtin::Addr),
            "LOADADDR"               => Some(Builtin::LoadAddr),
            "SIZEOF"                 => Some(Builtin::SizeOf),
            "SIZEOF_HEADERS"         => Some(Builtin::SizeOfHeaders),
            "ORIGIN"                 => Some(Builtin::Origin),
            "LENGTH"                 => Some(Builtin::Length),
            "DEFINED"                => Some(Builtin::Defined),
            "MAX"                    => Some(Builtin::Max),
            "MIN"                    => Some(Builtin::Min),
            "ABSOLUTE"               => Some(Builtin::Absolute),
            "BLOCK"                  => Some(Builtin::Block),
            "NEXT"                   => Some(Builtin::Next),
            "SEGMENT_START"          => Some(Builtin::SegmentStart),
            "DATA_SEGMENT_ALIGN"     => Some(Builtin::DataSegmentAlign),
            "DATA_SEGMENT_RELRO_END" => Some(Builtin::DataSegmentRelroEnd),
            "DATA_SEGMENT_END"       => Some(Builtin::DataSegmentEnd),
            "ASSERT"                 => Some(Builtin::Assert),
            _ => None
        }
    }

    /* how many arguments each built-in takes: (minimum, maximum) */
    pub fn arity(self) -> (usize, usize)
    {
        match self
        {
            Builtin::Align                  => (1, 2),
            Builtin::Addr                   => (1, 1),
            Builtin::LoadAddr               => (1, 1),
            Builtin::SizeOf                 => (1, 1),
            Builtin::SizeOfHeaders          => (0, 0),
            Builtin::Origin                 => (1, 1),
            Builtin::Length                 => (1, 1),
            Builtin::Defined                => (1, 1),
            Builtin::Max                    => (2, 2),
            Builtin::Min                    => (2, 2),
            Builtin::Absolute               => (1, 1),
            Builtin::Block                  => (1, 1),
            Builtin::Next                   => (1, 1),
            Builtin::SegmentStart           => (2, 2),
            Builtin::DataSegmentAlign       => (2, 2),
            Builtin::DataSegmentRelroEnd    => (2, 2),
            Builtin::DataSegmentEnd         => (1, 1),
            Builtin::Assert                 => (2, 2)
        }
    }
}

/* an expression tree node. binary and ternary nodes hold exactly the
   operand slots their operator requires, enforced by construction */
#[derive(Clone, PartialEq, Debug)]
pub enum Expression
{
    Value(u64),
    Symbol(String),
    Unary
    {
        op: UnaryOp,
        child: Box<Expression>
    },
    Binary
    {
        op: BinaryOp,
        lhs: Box<Expression>,
        rhs: Box<Expression>
    },
    Ternary
    {
        condition: Box<Expression>,
        if_true: Box<Expression>,
        if_false: Box<Expression>
    },
    Call
    {
        builtin: Builtin,
        args: Vec<Expression>
    }
}

impl Expression
{
    pub fn unary(op: UnaryOp, child: Expression) -> Expression
    {
        Expression::Unary { op, child: Box::new(child) }
    }

    pub fn binary(op: BinaryOp, lhs: Expression, rhs: Expression) -> Expression
    {
        Expression::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }
    }

    pub fn ternary(condition: Expression, if_true: Expression, if_false: Expression) -> Expression
    {
        Expression::Ternary
        {
            condition: Box::new(condition),
            if_true: Box::new(if_true),
            if_false: Box::new(if_false)
        }
    }

    /* true if any node in the tree mentions the location counter '.' */
    pub fn uses_dot(&self) -> bool
    {
        match self
        {
            Expression::Value(_) => false,
            Expression::Symbol(name) => name == ".",
            Expression::Unary { child, .. } => child.uses_dot(),
            Expression::Binary { lhs, rhs, .. } => lhs.uses_dot() || rhs.uses_dot(),
            Expression::Ternary { condition, if_true, if_false } =>
                condition.uses_dot() || if_true.uses_dot() || if_false.uses_dot(),
            Expression::Call { args, .. } => args.iter().any(|a| a.uses_dot())
        }
    }
}
