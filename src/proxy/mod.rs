//! Member redirection onto the target runtime
//!
//! - `policy`: per-type redirection policies and the immutable lookup table
//! - `template`: replacement expression templates with placeholders
//! - `resolver`: call-site resolution against the table

pub mod policy;
pub mod resolver;
pub mod template;

pub use policy::{
    MemberPolicy, ProxyBehavior, ProxyMode, RedirectionEntry, RedirectionPolicy, RedirectionTable,
    RedirectionTableBuilder,
};
pub use resolver::{Redirection, RedirectionResolver};
pub use template::{Fragment, Template, TemplateInstance};
