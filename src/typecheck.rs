//! Static type checking rules
//!
//! Pure predicates and combinators over [`TypeNode`] values: equality,
//! assignment compatibility, operator result types, cast validity, and the
//! numeric widening rank order. Nothing here mutates state; the semantic
//! analyzer calls in with a [`TypeRegistry`] reference where class
//! relationships matter.

use crate::ast::{CastKind, TypeNode};
use crate::symbols::TypeRegistry;
use thiserror::Error;

/// Error raised when an operation's operand types are invalid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Type error: {0}")]
pub struct TypeCheckError(pub String);

fn err<T>(message: impl Into<String>) -> Result<T, TypeCheckError> {
    Err(TypeCheckError(message.into()))
}

const NUMERIC_TYPES: &[&str] = &[
    "int",
    "float",
    "double",
    "char",
    "short",
    "long",
    "long long",
    "bool",
];

const INTEGRAL_TYPES: &[&str] = &["int", "char", "short", "long", "long long", "bool"];

/// Widening rank for numeric promotion. Unknown names rank as `int`.
fn type_rank(name: &str) -> u8 {
    match name {
        "bool" => 0,
        "char" => 1,
        "short" => 2,
        "int" => 3,
        "long" => 4,
        "long long" => 5,
        "float" => 6,
        "double" => 7,
        _ => 3,
    }
}

/// Exact structural equality: primitives compare name and signedness,
/// compound types compare element types, user-defined types compare names.
pub fn types_equal(a: &TypeNode, b: &TypeNode) -> bool {
    match (a, b) {
        (
            TypeNode::Primitive {
                name: n1,
                is_signed: s1,
                ..
            },
            TypeNode::Primitive {
                name: n2,
                is_signed: s2,
                ..
            },
        ) => n1 == n2 && s1 == s2,
        (TypeNode::Pointer { base: b1, .. }, TypeNode::Pointer { base: b2, .. }) => {
            types_equal(b1, b2)
        }
        (TypeNode::Reference { base: b1 }, TypeNode::Reference { base: b2 }) => {
            types_equal(b1, b2)
        }
        (TypeNode::Array { base: b1, .. }, TypeNode::Array { base: b2, .. }) => {
            types_equal(b1, b2)
        }
        (TypeNode::UserDefined { name: n1, .. }, TypeNode::UserDefined { name: n2, .. }) => {
            n1 == n2
        }
        _ => false,
    }
}

/// Assignment compatibility: may `source` flow into `target`?
pub fn is_compatible(source: &TypeNode, target: &TypeNode, registry: &TypeRegistry) -> bool {
    if types_equal(source, target) {
        return true;
    }

    // Pointer to pointer: element types must be compatible
    if let (TypeNode::Pointer { base: src, .. }, TypeNode::Pointer { base: dst, .. }) =
        (source, target)
    {
        return is_compatible(src, dst, registry);
    }

    // Numeric conversions between primitives
    if let (TypeNode::Primitive { name: src, .. }, TypeNode::Primitive { name: dst, .. }) =
        (source, target)
    {
        return NUMERIC_TYPES.contains(&src.as_str()) && NUMERIC_TYPES.contains(&dst.as_str());
    }

    // Derived-to-base over the class hierarchy
    if let (TypeNode::UserDefined { name: src, .. }, TypeNode::UserDefined { name: dst, .. }) =
        (source, target)
    {
        return registry.is_derived_from(src, dst);
    }

    // nullptr to any pointer
    if let (TypeNode::Primitive { name, .. }, TypeNode::Pointer { .. }) = (source, target) {
        return name == "nullptr_t";
    }

    false
}

/// Usable in a boolean context: any primitive or pointer.
pub fn is_boolean_compatible(ty: &TypeNode) -> bool {
    matches!(ty, TypeNode::Primitive { .. } | TypeNode::Pointer { .. })
}

pub fn is_integral(ty: &TypeNode) -> bool {
    matches!(ty, TypeNode::Primitive { name, .. } if INTEGRAL_TYPES.contains(&name.as_str()))
}

pub fn is_numeric(ty: &TypeNode) -> bool {
    matches!(ty, TypeNode::Primitive { name, .. } if NUMERIC_TYPES.contains(&name.as_str()))
}

/// The wider of two primitive types under the rank order
/// `bool < char < short < int < long < long long < float < double`.
pub fn wider_type(a: &TypeNode, b: &TypeNode) -> TypeNode {
    let rank_of = |ty: &TypeNode| match ty {
        TypeNode::Primitive { name, .. } => type_rank(name),
        _ => type_rank("int"),
    };
    if rank_of(a) >= rank_of(b) {
        a.clone()
    } else {
        b.clone()
    }
}

/// Result type of a binary operation, or an error when the operand types
/// do not fit the operator.
pub fn binary_result_type(
    left: &TypeNode,
    op: &str,
    right: &TypeNode,
    registry: &TypeRegistry,
) -> Result<TypeNode, TypeCheckError> {
    // Comparisons require compatibility in either direction and yield bool
    if matches!(op, "==" | "!=" | "<" | ">" | "<=" | ">=" | "<=>") {
        if !is_compatible(left, right, registry) && !is_compatible(right, left, registry) {
            return err(format!(
                "Cannot compare incompatible types in '{}' operation",
                op
            ));
        }
        return Ok(TypeNode::primitive("bool"));
    }

    // Logical operators
    if matches!(op, "&&" | "||") {
        if !is_boolean_compatible(left) || !is_boolean_compatible(right) {
            return err(format!(
                "Logical operator '{}' requires boolean operands",
                op
            ));
        }
        return Ok(TypeNode::primitive("bool"));
    }

    // Arithmetic
    if matches!(op, "+" | "-" | "*" | "/" | "%") {
        if !matches!(left, TypeNode::Primitive { .. })
            || !matches!(right, TypeNode::Primitive { .. })
        {
            return err(format!(
                "Arithmetic operator '{}' requires numeric operands",
                op
            ));
        }
        return Ok(wider_type(left, right));
    }

    // Bitwise and shifts
    if matches!(op, "&" | "|" | "^" | "<<" | ">>") {
        if !is_integral(left) || !is_integral(right) {
            return err(format!(
                "Bitwise operator '{}' requires integral operands",
                op
            ));
        }
        return Ok(wider_type(left, right));
    }

    err(format!("Unknown binary operator: {}", op))
}

/// Result type of a unary operation.
pub fn unary_result_type(op: &str, operand: &TypeNode) -> Result<TypeNode, TypeCheckError> {
    match op {
        "!" => {
            if !is_boolean_compatible(operand) {
                return err("Logical NOT requires boolean operand");
            }
            Ok(TypeNode::primitive("bool"))
        }
        "~" => {
            if !is_integral(operand) {
                return err("Bitwise NOT requires integral operand");
            }
            Ok(operand.clone())
        }
        "+" | "-" => {
            if !matches!(operand, TypeNode::Primitive { .. }) {
                return err(format!("Unary '{}' requires numeric operand", op));
            }
            Ok(operand.clone())
        }
        "++" | "--" => {
            if !matches!(operand, TypeNode::Primitive { .. } | TypeNode::Pointer { .. }) {
                return err(format!("'{}' requires numeric or pointer operand", op));
            }
            Ok(operand.clone())
        }
        "*" => match operand {
            TypeNode::Pointer { base, .. } => Ok((**base).clone()),
            _ => err("Dereference requires pointer type"),
        },
        "&" => Ok(TypeNode::pointer_to(operand.clone())),
        _ => err(format!("Unknown unary operator: {}", op)),
    }
}

/// Validate a call against a parameter list, yielding the return type.
pub fn check_function_call(
    return_type: &TypeNode,
    arg_types: &[TypeNode],
    param_types: &[TypeNode],
    registry: &TypeRegistry,
) -> Result<TypeNode, TypeCheckError> {
    if arg_types.len() != param_types.len() {
        return err(format!(
            "Function call: expected {} arguments, got {}",
            param_types.len(),
            arg_types.len()
        ));
    }

    for (i, (arg, param)) in arg_types.iter().zip(param_types).enumerate() {
        if !is_compatible(arg, param, registry) {
            return err(format!(
                "Function call: argument {} type mismatch. \
                 Expected compatible with parameter type",
                i + 1
            ));
        }
    }

    Ok(return_type.clone())
}

/// Subscripting requires an array or pointer and an integral index; the
/// result is the element type.
pub fn check_array_access(
    array_type: &TypeNode,
    index_type: &TypeNode,
) -> Result<TypeNode, TypeCheckError> {
    let element = match array_type {
        TypeNode::Array { base, .. } => (**base).clone(),
        TypeNode::Pointer { base, .. } => (**base).clone(),
        _ => return err("Array access requires array or pointer type"),
    };

    if !is_integral(index_type) {
        return err("Array index must be integral type");
    }

    Ok(element)
}

/// Member access through `.` or `->`. Arrow access dereferences the
/// receiver first; the member is resolved through the type registry.
pub fn check_member_access(
    object_type: &TypeNode,
    member_name: &str,
    is_arrow: bool,
    registry: &TypeRegistry,
) -> Result<TypeNode, TypeCheckError> {
    let receiver = if is_arrow {
        match object_type {
            TypeNode::Pointer { base, .. } => base.as_ref(),
            _ => return err("Arrow operator requires pointer type"),
        }
    } else {
        object_type
    };

    let class_name = match receiver {
        TypeNode::UserDefined { name, .. } => name,
        _ => return err("Member access requires class/struct type"),
    };

    match registry.get_class_member(class_name, member_name) {
        Some(member) => Ok(member.symbol_type.clone()),
        None => err(format!(
            "Class '{}' has no member '{}'",
            class_name, member_name
        )),
    }
}

/// Validate a return statement against the enclosing function's declared
/// return type. `returned` is `None` for a bare `return;`.
pub fn check_return_type(
    declared: Option<&TypeNode>,
    returned: Option<&TypeNode>,
    registry: &TypeRegistry,
) -> Result<(), TypeCheckError> {
    let declared = match declared {
        Some(ty) => ty,
        None => return err("Return statement outside of function"),
    };

    if declared.is_void() {
        if returned.is_some() {
            return err("Void function cannot return a value");
        }
        return Ok(());
    }

    let returned = match returned {
        Some(ty) => ty,
        None => return err("Non-void function must return a value"),
    };

    if !is_compatible(returned, declared, registry) {
        return err("Return type incompatible with function return type");
    }

    Ok(())
}

/// Validate a named cast, yielding the target type on success.
pub fn check_cast(
    source_type: &TypeNode,
    target_type: &TypeNode,
    kind: CastKind,
) -> Result<TypeNode, TypeCheckError> {
    match kind {
        CastKind::Static => {
            if matches!(source_type, TypeNode::Primitive { .. })
                && matches!(target_type, TypeNode::Primitive { .. })
            {
                return Ok(target_type.clone());
            }
            if matches!(source_type, TypeNode::Pointer { .. })
                && matches!(target_type, TypeNode::Pointer { .. })
            {
                return Ok(target_type.clone());
            }
            err("static_cast cannot convert between these types")
        }
        CastKind::Dynamic => {
            let (src, dst) = match (source_type, target_type) {
                (TypeNode::Pointer { base: src, .. }, TypeNode::Pointer { base: dst, .. }) => {
                    (src, dst)
                }
                _ => return err("dynamic_cast requires pointer types"),
            };
            if matches!(src.as_ref(), TypeNode::UserDefined { .. })
                && matches!(dst.as_ref(), TypeNode::UserDefined { .. })
            {
                return Ok(target_type.clone());
            }
            err("dynamic_cast requires class types")
        }
        // Only qualifiers change
        CastKind::Const => Ok(target_type.clone()),
        // Any pointer conversion is allowed
        CastKind::Reinterpret => Ok(target_type.clone()),
    }
}
