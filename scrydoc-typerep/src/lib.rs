//! # scrydoc typerep
//!
//! The unified type/documentation representation and the machinery that
//! produces it:
//! - [`Typish`]: namespaces, functions, classes, dicts, lists, one-ofs,
//!   typedefs, constants, textual type references and descriptors, with
//!   the [`ChildTraversable`] / [`ArgTraversable`] lookup capabilities
//! - [`LifeStory`]: where a symbol came from and every name it was found
//!   under
//! - the doc vocabulary (`@args`, `@param`, `@dict`, `@key`, ...) used in
//!   doc comments and type documents
//! - the [`Muncher`], which converts abstract interpreter output into
//!   symbols

pub mod jsdoc;
pub mod munge;
pub mod typish;

#[cfg(test)]
mod tests;

pub use jsdoc::{
    chew_type, chew_value, doc_registry, read_doc_comment, register, ret_desc, DocBits,
    DocLanguage, DocRequirer, DocStream, DocValue, JsDocVocabulary, EXPORTS_CONTEXT,
    REQUIRER_VALUE,
};
pub use munge::{Muncher, SymbolTable};
pub use typish::{
    ArgKey, ArgList, ArgTraversable, ChildTraversable, ClassType, Descriptor, DescriptorKind,
    DictOf, FuncKind, FuncSym, Group, LifeStory, ListOf, ListType, Members, Multiplicity,
    NamedValue, Namespace, ObjectKind, ObjectSym, OneOf, Owner, Protocol, Sym, TraverseMode,
    TypeRef, Typedef, Typish,
};
