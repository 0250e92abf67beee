//! Unification engine over type points.
//!
//! Points live in an `ena` union-find table whose values are optional
//! [`TypeTag`]s. An unset tag unifies with anything and adopts the other
//! side; two set tags must be equal.
//!
//! The points for `number`, `boolean`, `string` and `void` are allocated once
//! per table and shared. Every other type name gets a fresh point, so opaque
//! types are only merged through unification, never by name lookup.

use ena::unify::{EqUnifyValue, InPlaceUnificationTable, UnifyKey};
use thiserror::Error;

use crate::ty::TypeTag;

/// A type variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point(u32);

impl UnifyKey for Point {
    type Value = Option<TypeTag>;

    fn index(&self) -> u32 {
        self.0
    }

    fn from_index(u: u32) -> Self {
        Point(u)
    }

    fn tag() -> &'static str {
        "Point"
    }
}

impl EqUnifyValue for TypeTag {}

/// Two points with different concrete types were unified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot mix {left} with {right}")]
pub struct TypeConflict {
    pub left: TypeTag,
    pub right: TypeTag,
}

pub struct TypeTable {
    table: InPlaceUnificationTable<Point>,
    number: Point,
    boolean: Point,
    string: Point,
    unit: Point,
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeTable {
    pub fn new() -> Self {
        let mut table = InPlaceUnificationTable::new();
        let number = table.new_key(Some(TypeTag::Number));
        let boolean = table.new_key(Some(TypeTag::Boolean));
        let string = table.new_key(Some(TypeTag::String));
        let unit = table.new_key(Some(TypeTag::Unit));
        Self {
            table,
            number,
            boolean,
            string,
            unit,
        }
    }

    /// A point with no type yet.
    pub fn fresh(&mut self) -> Point {
        self.table.new_key(None)
    }

    pub fn number(&self) -> Point {
        self.number
    }

    pub fn boolean(&self) -> Point {
        self.boolean
    }

    pub fn string(&self) -> Point {
        self.string
    }

    pub fn unit(&self) -> Point {
        self.unit
    }

    /// The point for a declared type name; `None` yields a fresh point.
    pub fn ground(&mut self, name: Option<&str>) -> Point {
        let Some(name) = name.filter(|n| !n.is_empty()) else {
            return self.fresh();
        };
        match TypeTag::from_name(name) {
            TypeTag::Number => self.number,
            TypeTag::Boolean => self.boolean,
            TypeTag::String => self.string,
            TypeTag::Unit => self.unit,
            other => self.table.new_key(Some(other)),
        }
    }

    /// Canonical representative of `p`.
    pub fn find(&mut self, p: Point) -> Point {
        self.table.find(p)
    }

    /// Merge two points. Fails when both carry different types; the table
    /// is left unchanged in that case.
    pub fn union(&mut self, a: Point, b: Point) -> Result<(), TypeConflict> {
        self.table
            .unify_var_var(a, b)
            .map_err(|(left, right)| TypeConflict { left, right })
    }

    /// Current type of `p`, if determined.
    pub fn type_of(&mut self, p: Point) -> Option<TypeTag> {
        self.table.probe_value(p)
    }

    /// Give `p` the type `number` if it has none yet.
    pub fn default_to_number(&mut self, p: Point) -> TypeTag {
        match self.type_of(p) {
            Some(tag) => tag,
            None => {
                // An untyped point unifies with anything.
                let _ = self.union(p, self.number);
                TypeTag::Number
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_adopts_concrete_type() {
        let mut t = TypeTable::new();
        let a = t.fresh();
        let b = t.fresh();
        t.union(a, b).unwrap();
        assert_eq!(t.type_of(a), None);
        let n = t.number();
        t.union(b, n).unwrap();
        assert_eq!(t.find(a), t.find(n));
        assert_eq!(t.type_of(a), Some(TypeTag::Number));
    }

    #[test]
    fn test_conflict_reports_both_types() {
        let mut t = TypeTable::new();
        let (n, s) = (t.number(), t.string());
        let err = t.union(n, s).unwrap_err();
        assert_eq!(err.to_string(), "cannot mix number with string");
    }

    #[test]
    fn test_transitive_conflict() {
        let mut t = TypeTable::new();
        let a = t.fresh();
        let b = t.fresh();
        let c = t.fresh();
        t.union(a, b).unwrap();
        t.union(b, c).unwrap();
        let n = t.number();
        t.union(a, n).unwrap();
        let s = t.string();
        assert!(t.union(c, s).is_err());
        // The failed union changed nothing.
        assert_eq!(t.type_of(c), Some(TypeTag::Number));
        assert_ne!(t.find(c), t.find(s));
    }

    #[test]
    fn test_ground_points() {
        let mut t = TypeTable::new();
        assert_eq!(t.ground(Some("Number")), t.number());
        assert_eq!(t.ground(Some("void")), t.unit());
        let img1 = t.ground(Some("Image"));
        let img2 = t.ground(Some("Image"));
        assert_ne!(img1, img2);
        // Same opaque name: compatible.
        t.union(img1, img2).unwrap();
        let sprite = t.ground(Some("Sprite"));
        assert!(t.union(img1, sprite).is_err());
        let unset = t.ground(None);
        assert_eq!(t.type_of(unset), None);
    }

    #[test]
    fn test_default_to_number() {
        let mut t = TypeTable::new();
        let p = t.fresh();
        assert_eq!(t.default_to_number(p), TypeTag::Number);
        assert_eq!(t.type_of(p), Some(TypeTag::Number));
        let s = t.string();
        assert_eq!(t.default_to_number(s), TypeTag::String);
    }
}
