//! Nominal type descriptors used to match declared return types against adapters.
//!
//! Endpoints declare what they return with a [`Type`]; adapters inspect it to decide whether they
//! handle the endpoint and which type the next stage must produce. Errors carry a runtime
//! [`Class`] so adapters can check whether a raised failure fits a declared error parameter.
//!
//! ```
//! use whiskers::types::{Class, Type, EITHER, EXCEPTION, STRING};
//!
//! static TIMEOUT: Class = Class::extends("Timeout", &EXCEPTION);
//!
//! let declared = Type::parameterized(&EITHER, vec![Type::of(&TIMEOUT), Type::of(&STRING)]);
//! assert!(declared.is(&EITHER));
//! assert!(declared.first_arg().compatible(&EXCEPTION));
//! assert_eq!(declared.to_string(), "Either<Timeout, String>");
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};

/// A nominal type with single inheritance.
///
/// Classes are declared as `static` items and compared by address, so two unrelated classes
/// sharing a simple name stay distinct.
pub struct Class {
    name: &'static str,
    parent: Option<&'static Class>,
}

impl Class {
    /// A class without a parent.
    pub const fn root(name: &'static str) -> Self {
        Self { name, parent: None }
    }

    /// A class extending `parent`.
    pub const fn extends(name: &'static str, parent: &'static Class) -> Self {
        Self { name, parent: Some(parent) }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn parent(&self) -> Option<&'static Class> {
        self.parent
    }

    /// True when `self` is `other` or inherits from it.
    pub fn is_subclass_of(&self, other: &Class) -> bool {
        if self == other {
            return true;
        }
        let mut current = self.parent;
        while let Some(class) = current {
            if class == other {
                return true;
            }
            current = class.parent;
        }
        false
    }
}

impl PartialEq for Class {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl Eq for Class {}

impl Hash for Class {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(self, state);
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.parent {
            Some(parent) => write!(f, "{} <: {}", self.name, parent.name),
            None => f.write_str(self.name),
        }
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Unconstrained root of every class.
pub static ANY: Class = Class::root("Any");
/// Unconstrained root of every error class.
pub static THROWABLE: Class = Class::extends("Throwable", &ANY);
/// Generic exception root; adapters that fold raised failures require this bound.
pub static EXCEPTION: Class = Class::extends("Exception", &THROWABLE);
pub static STRING: Class = Class::extends("String", &ANY);

pub static COLLECTION: Class = Class::extends("Collection", &ANY);
pub static LIST: Class = Class::extends("List", &COLLECTION);
pub static SET: Class = Class::extends("Set", &COLLECTION);
pub static STREAM: Class = Class::extends("Stream", &ANY);

pub static EITHER: Class = Class::extends("Either", &ANY);
pub static OPTION: Class = Class::extends("Option", &ANY);
pub static EVAL: Class = Class::extends("Eval", &ANY);
pub static NON_EMPTY_LIST: Class = Class::extends("NonEmptyList", &ANY);
pub static EFFECT: Class = Class::extends("Effect", &ANY);
pub static SEQUENCE: Class = Class::extends("Sequence", &ANY);
pub static FLOW: Class = Class::extends("Flow", &ANY);
pub static DEFERRED: Class = Class::extends("Deferred", &ANY);
pub static JOB: Class = Class::extends("Job", &ANY);

/// Declared type of an endpoint result or of a type argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// No value at all.
    None,
    /// A plain class.
    Class(&'static Class),
    /// A generic class applied to arguments, e.g. `Either<Exception, String>`.
    Parameterized { raw: &'static Class, args: Vec<Type> },
    /// A use-site variance projection; `None` is the star projection.
    Wildcard { upper: Option<Box<Type>> },
}

impl Type {
    pub fn of(class: &'static Class) -> Self {
        Type::Class(class)
    }

    pub fn parameterized(raw: &'static Class, args: Vec<Type>) -> Self {
        Type::Parameterized { raw, args }
    }

    /// `out T` projection.
    pub fn covariant(upper: Type) -> Self {
        Type::Wildcard { upper: Some(Box::new(upper)) }
    }

    /// `*` projection.
    pub fn star() -> Self {
        Type::Wildcard { upper: None }
    }

    pub fn any() -> Self {
        Type::Class(&ANY)
    }

    /// Raw class, looking through wildcards. `Type::None` has none.
    pub fn raw(&self) -> Option<&'static Class> {
        match self {
            Type::None => None,
            Type::Class(class) => Some(class),
            Type::Parameterized { raw, .. } => Some(raw),
            Type::Wildcard { upper: Some(upper) } => upper.raw(),
            Type::Wildcard { upper: None } => Some(&ANY),
        }
    }

    /// Exact raw-class match.
    pub fn is(&self, class: &Class) -> bool {
        self.raw().is_some_and(|raw| raw == class)
    }

    /// True when the raw class is `class` or one of its subclasses.
    pub fn compatible(&self, class: &Class) -> bool {
        self.raw().is_some_and(|raw| raw.is_subclass_of(class))
    }

    /// Type arguments as declared (empty for non-generic types).
    pub fn args(&self) -> &[Type] {
        match self {
            Type::Parameterized { args, .. } => args,
            Type::Wildcard { upper: Some(upper) } => upper.args(),
            _ => &[],
        }
    }

    /// The `index`-th type argument with projections unwrapped to their bound. Missing arguments
    /// resolve to `Any`.
    pub fn arg(&self, index: usize) -> Type {
        self.args().get(index).map(Type::unwrap_projection).unwrap_or_else(Type::any)
    }

    pub fn first_arg(&self) -> Type {
        self.arg(0)
    }

    fn unwrap_projection(&self) -> Type {
        match self {
            Type::Wildcard { upper: Some(upper) } => upper.unwrap_projection(),
            Type::Wildcard { upper: None } => Type::any(),
            other => other.clone(),
        }
    }
}

impl From<&'static Class> for Type {
    fn from(class: &'static Class) -> Self {
        Type::Class(class)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::None => f.write_str("()"),
            Type::Class(class) => f.write_str(class.name()),
            Type::Parameterized { raw, args } => {
                write!(f, "{}<", raw.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(">")
            }
            Type::Wildcard { upper: Some(upper) } => write!(f, "out {}", upper),
            Type::Wildcard { upper: None } => f.write_str("*"),
        }
    }
}
