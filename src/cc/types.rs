/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! The restricted type system (spec.md §3 "Type"): `char`/`unsigned char`,
//! `int`/`unsigned int` (16-bit), pointers, single-level arrays, structs
//! with no padding, `void`, and function types. No `long`, no floating
//! point, no multi-dimensional arrays (spec.md Non-goals).

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CType {
    Char,
    UChar,
    Int,
    UInt,
    Pointer(Box<CType>),
    Array(Box<CType>, u16),
    Struct(String),
    Void,
    Function(Box<CType>, Vec<CType>),
}

impl CType {
    pub fn is_char_width(&self) -> bool {
        matches!(self, CType::Char | CType::UChar)
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, CType::Char | CType::UChar | CType::Int | CType::UInt)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, CType::Pointer(_))
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(self, CType::UChar | CType::UInt)
    }

    /// Array-to-pointer decay applied when a value of this type is passed
    /// as an argument or assigned to a pointer parameter (spec.md §3
    /// "Array-to-pointer decays when passed as an argument").
    pub fn decay(&self) -> CType {
        match self {
            CType::Array(elem, _) => CType::Pointer(elem.clone()),
            other => other.clone(),
        }
    }

    /// Whether `self` and `other` are the same type for the purposes of
    /// extern/prototype matching, after array-to-pointer decay on both
    /// sides (spec.md §4.1.3: "`char buf[]` matches `char *buf` matches
    /// `char buf[N]`").
    pub fn compatible_for_linkage(&self, other: &CType) -> bool {
        self.decay() == other.decay()
    }
}

#[derive(Debug, Clone)]
pub struct StructField {
    pub name: String,
    pub ty: CType,
    pub offset: u16,
}

#[derive(Debug, Clone)]
pub struct StructLayout {
    pub tag: String,
    pub fields: Vec<StructField>,
    pub size: u16,
}

impl StructLayout {
    pub fn field(&self, name: &str) -> Option<&StructField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Struct tags and typedef aliases accumulated while walking declarations.
/// Shared between the parser (so `typedef`'d names parse as type
/// specifiers without the `struct` keyword) and sema (struct layout,
/// `sizeof`).
#[derive(Debug, Clone, Default)]
pub struct TypeTable {
    pub structs: HashMap<String, StructLayout>,
    pub typedefs: HashMap<String, CType>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&self, ty: &CType) -> CType {
        match ty {
            CType::Pointer(inner) => CType::Pointer(Box::new(self.resolve(inner))),
            CType::Array(inner, n) => CType::Array(Box::new(self.resolve(inner)), *n),
            other => other.clone(),
        }
    }

    /// `sizeof` (spec.md §4.1.3 "`sizeof` is a compile-time integer").
    pub fn size_of(&self, ty: &CType) -> Option<u16> {
        Some(match ty {
            CType::Char | CType::UChar => 1,
            CType::Int | CType::UInt => 2,
            CType::Pointer(_) => 2,
            CType::Array(elem, n) => self.size_of(elem)? * n,
            CType::Struct(tag) => self.structs.get(tag)?.size,
            CType::Void => return None,
            CType::Function(_, _) => return None,
        })
    }

    /// Lays out `fields` in declaration order with no padding (spec.md §3
    /// "Struct fields are laid out in declaration order with no padding;
    /// total size ≤ 255 bytes"), registers the result under `tag`, and
    /// returns it.
    pub fn define_struct(&mut self, tag: &str, fields: Vec<(String, CType)>) -> Result<StructLayout, String> {
        let mut laid_out = Vec::with_capacity(fields.len());
        let mut offset: u32 = 0;
        for (name, ty) in fields {
            let size = self.size_of(&ty).ok_or_else(|| format!("field `{name}` has incomplete type"))? as u32;
            if offset > 255 {
                return Err(format!("struct `{tag}` exceeds 255 bytes"));
            }
            laid_out.push(StructField {
                name,
                ty,
                offset: offset as u16,
            });
            offset += size;
        }
        if offset > 255 {
            return Err(format!("struct `{tag}` size {offset} exceeds the 255-byte limit"));
        }
        let layout = StructLayout {
            tag: tag.to_string(),
            fields: laid_out,
            size: offset as u16,
        };
        self.structs.insert(tag.to_string(), layout.clone());
        Ok(layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn struct_fields_lay_out_with_no_padding() {
        let mut table = TypeTable::new();
        let layout = table
            .define_struct("P", vec![("x".to_string(), CType::Int), ("y".to_string(), CType::Int)])
            .unwrap();
        assert_eq!(layout.size, 4);
        assert_eq!(layout.field("y").unwrap().offset, 2);
    }

    #[test]
    fn oversize_struct_is_rejected() {
        let mut table = TypeTable::new();
        let fields = vec![("buf".to_string(), CType::Array(Box::new(CType::Char), 300))];
        assert!(table.define_struct("Big", fields).is_err());
    }

    #[test]
    fn array_decays_to_pointer_for_linkage() {
        let array_ty = CType::Array(Box::new(CType::Char), 10);
        let ptr_ty = CType::Pointer(Box::new(CType::Char));
        assert!(array_ty.compatible_for_linkage(&ptr_ty));
    }
}
