//! Template syntax tree. This is also the body of a compiled artifact.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Node {
    Text {
        text: String,
    },
    Output {
        expr: Expr,
    },
    If {
        branches: Vec<Branch>,
        otherwise: Option<Vec<Node>>,
    },
    Foreach {
        from: Expr,
        item: String,
        key: Option<String>,
        body: Vec<Node>,
        empty: Option<Vec<Node>>,
    },
    Include {
        file: Expr,
        params: Vec<Param>,
    },
    Assign {
        var: String,
        value: Expr,
    },
    /// Call to a function plugin
    Call {
        name: String,
        params: Vec<Param>,
    },
    /// Block plugin wrapping a body
    Block {
        name: String,
        params: Vec<Param>,
        body: Vec<Node>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub cond: Cond,
    pub body: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Var(Vec<String>),
    Str(String),
    Num(f64),
    Bool(bool),
    Filtered {
        base: Box<Expr>,
        modifiers: Vec<Modifier>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Modifier {
    pub name: String,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cond {
    Truthy(Expr),
    Not(Box<Cond>),
    Compare { lhs: Expr, op: CmpOp, rhs: Expr },
    And(Box<Cond>, Box<Cond>),
    Or(Box<Cond>, Box<Cond>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl CmpOp {
    /// Map a symbolic or word operator (`==`, `eq`, `neq`, ...) to a comparison
    pub fn from_token(token: &str) -> Option<Self> {
        Some(match token {
            "==" | "eq" => CmpOp::Eq,
            "!=" | "ne" | "neq" => CmpOp::Ne,
            "<" | "lt" => CmpOp::Lt,
            ">" | "gt" => CmpOp::Gt,
            "<=" | "le" | "lte" => CmpOp::Le,
            ">=" | "ge" | "gte" => CmpOp::Ge,
            _ => return None,
        })
    }
}

/// Walk every modifier name used in an expression
pub(crate) fn visit_modifiers<'a>(expr: &'a Expr, f: &mut impl FnMut(&'a str)) {
    if let Expr::Filtered { base, modifiers } = expr {
        visit_modifiers(base, f);
        for modifier in modifiers {
            f(&modifier.name);
            for arg in &modifier.args {
                visit_modifiers(arg, f);
            }
        }
    }
}
