//! Human-readable type rendering for diagnostic messages.

use crate::intern::TypeInterner;
use crate::types::{LiteralValue, TypeId, TypeKey};
use sift_common::limits;

impl TypeInterner {
    pub fn display(&self, ty: TypeId) -> String {
        self.display_depth(ty, 0)
    }

    fn display_depth(&self, ty: TypeId, depth: u32) -> String {
        if depth > limits::MAX_DISPLAY_DEPTH {
            return "...".to_string();
        }
        let ty = self.resolve_recursive(ty);
        let Some(key) = self.lookup(ty) else {
            return "<invalid>".to_string();
        };
        match key {
            TypeKey::Unknown => "Unknown".to_string(),
            TypeKey::Any => "Any".to_string(),
            TypeKey::Unbound => "Unbound".to_string(),
            TypeKey::Never => "Never".to_string(),
            TypeKey::None => "None".to_string(),
            TypeKey::Module(name) => format!("module '{}'", self.resolve_atom(name)),
            TypeKey::Class(shape, args) => {
                let name = self.resolve_atom(self.class_shape(shape).name);
                format!("type[{}]", self.specialized(&name, args, depth))
            }
            TypeKey::Instance(shape, args) => {
                let name = self.resolve_atom(self.class_shape(shape).name);
                self.specialized(&name, args, depth)
            }
            TypeKey::Function(shape_id) => {
                let shape = self.function_shape(shape_id);
                let params: Vec<String> = shape
                    .params
                    .iter()
                    .map(|p| {
                        format!(
                            "{}: {}",
                            self.resolve_atom(p.name),
                            self.display_depth(p.ty, depth + 1)
                        )
                    })
                    .collect();
                format!(
                    "({}) -> {}",
                    params.join(", "),
                    self.display_depth(shape.ret, depth + 1)
                )
            }
            TypeKey::Overloaded(list) => {
                let count = self.type_list(list).len();
                format!("overloaded function ({count} signatures)")
            }
            TypeKey::Union(list) => {
                let members = self.type_list(list);
                let parts: Vec<String> = members
                    .iter()
                    .map(|&m| self.display_depth(m, depth + 1))
                    .collect();
                parts.join(" | ")
            }
            TypeKey::TypeVar(info) => self.resolve_atom(info.name).to_string(),
            TypeKey::Literal(value) => match value {
                LiteralValue::Int(v) => format!("Literal[{v}]"),
                LiteralValue::Str(s) => format!("Literal['{}']", self.resolve_atom(s)),
                LiteralValue::Bool(v) => {
                    format!("Literal[{}]", if v { "True" } else { "False" })
                }
            },
            // An unresolved marker means we are printing mid-evaluation.
            TypeKey::Recursive(_) => "...".to_string(),
        }
    }

    fn specialized(&self, name: &str, args: crate::types::TypeListId, depth: u32) -> String {
        let args = self.type_list(args);
        if args.is_empty() {
            return name.to_string();
        }
        let rendered: Vec<String> = args
            .iter()
            .map(|&a| self.display_depth(a, depth + 1))
            .collect();
        format!("{}[{}]", name, rendered.join(", "))
    }
}
