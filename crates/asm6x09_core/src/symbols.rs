//! Labels, struct declarations and dotted field paths.
//!
//! Labels may share a name; lookups pick the instance nearest to the
//! requesting address once every instance has been bound. Structs live in an
//! insertion-ordered arena and fields refer to nested structs by [`StructId`].

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::{
    expr::{EvalError, eval_constant},
    line::ADDRESS_SPACE,
    source::{FileId, Span},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StructId(pub u32);

#[derive(Clone, Debug)]
pub struct Label {
    pub name: String,
    pub address: Option<u32>,
    /// Opcode of the defining line; names a struct when the label tags an instance.
    pub instance_of: Option<String>,
    pub file: FileId,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Byte,
    Word,
    Struct(String),
}

impl FieldKind {
    pub fn from_opcode(opcode: &str) -> Self {
        match opcode.to_ascii_lowercase().as_str() {
            "fcb" => FieldKind::Byte,
            "fdb" => FieldKind::Word,
            _ => FieldKind::Struct(opcode.to_string()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Field {
    pub name: Option<String>,
    pub kind: FieldKind,
    /// Repeat specification: `?`, `n dup(?)` or `n`.
    pub count: String,
    pub offset: Option<u32>,
    pub nested: Option<StructId>,
    pub file: FileId,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<Field>,
    pub byte_length: Option<u32>,
    /// Width of every primitive slot, nested structs and repeats flattened.
    pub byte_lengths: Vec<u8>,
    pub file: FileId,
    pub span: Span,
}

impl StructDef {
    pub fn new(name: impl Into<String>, file: FileId, span: Span) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            byte_length: None,
            byte_lengths: Vec::new(),
            file,
            span,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields
            .iter()
            .find(|field| field.name.as_deref() == Some(name))
    }
}

#[derive(Clone, Debug, Error)]
pub enum SymbolError {
    #[error("struct `{name}` is declared more than once")]
    DuplicateStruct {
        name: String,
        file: FileId,
        span: Span,
    },
    #[error("struct `{name}` contains itself ({cycle})")]
    CyclicStruct {
        name: String,
        cycle: String,
        file: FileId,
        span: Span,
    },
    #[error("field type `{kind}` in struct `{owner}` is neither fcb, fdb nor a struct")]
    UnknownFieldType {
        owner: String,
        kind: String,
        file: FileId,
        span: Span,
    },
    #[error("cannot read repeat count `{text}` in struct `{owner}`: {reason}")]
    BadRepeatCount {
        owner: String,
        text: String,
        reason: String,
        file: FileId,
        span: Span,
    },
}

impl SymbolError {
    pub fn location(&self) -> (FileId, Span) {
        match self {
            SymbolError::DuplicateStruct { file, span, .. }
            | SymbolError::CyclicStruct { file, span, .. }
            | SymbolError::UnknownFieldType { file, span, .. }
            | SymbolError::BadRepeatCount { file, span, .. } => (*file, span.clone()),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    Pending,
    InProgress,
    Done,
}

#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    labels: Vec<Label>,
    labels_by_name: FxHashMap<String, Vec<usize>>,
    structs: IndexMap<String, StructDef>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn struct_count(&self) -> usize {
        self.structs.len()
    }

    pub fn struct_def(&self, id: StructId) -> &StructDef {
        &self.structs[id.0 as usize]
    }

    pub fn struct_by_name(&self, name: &str) -> Option<(StructId, &StructDef)> {
        self.structs
            .get_full(name)
            .map(|(idx, _, def)| (StructId(idx as u32), def))
    }

    pub fn declare_struct(&mut self, def: StructDef) -> Result<StructId, SymbolError> {
        if self.structs.contains_key(&def.name) {
            return Err(SymbolError::DuplicateStruct {
                name: def.name.clone(),
                file: def.file,
                span: def.span.clone(),
            });
        }
        let (idx, _) = self.structs.insert_full(def.name.clone(), def);
        Ok(StructId(idx as u32))
    }

    pub fn declare_label(
        &mut self,
        name: impl Into<String>,
        instance_of: Option<String>,
        file: FileId,
        span: Span,
    ) {
        let name = name.into();
        self.labels_by_name
            .entry(name.clone())
            .or_default()
            .push(self.labels.len());
        self.labels.push(Label {
            name,
            address: None,
            instance_of,
            file,
            span,
        });
    }

    /// Binds the first unbound label called `name`. Succeeds without change
    /// when a label of that name already sits at `address`.
    pub fn bind_label_address(&mut self, name: &str, address: u32) -> bool {
        let Some(ids) = self.labels_by_name.get(name) else {
            return false;
        };
        if ids.iter().any(|&id| self.labels[id].address == Some(address)) {
            return true;
        }
        match ids.iter().find(|&&id| self.labels[id].address.is_none()) {
            Some(&id) => {
                self.labels[id].address = Some(address);
                true
            }
            None => false,
        }
    }

    pub fn lookup(&self, path: &str, anchor: u32) -> Result<i64, EvalError> {
        if let Some(label) = self.nearest_label(path, anchor)? {
            return Ok(label_value(label));
        }

        let mut segments = path.split('.').filter(|segment| !segment.is_empty());
        let Some(base) = segments.next() else {
            return Err(unresolved(path));
        };
        let fields: Vec<&str> = segments.collect();

        let (mut value, mut current) = match self.nearest_label(base, anchor)? {
            Some(label) if fields.is_empty() => return Ok(label_value(label)),
            Some(label) => {
                let instance = label
                    .instance_of
                    .as_deref()
                    .and_then(|name| self.struct_by_name(name))
                    .ok_or_else(|| {
                        EvalError::Malformed(format!(
                            "label `{base}` does not mark a struct instance, so `{path}` has no fields"
                        ))
                    })?;
                (label_value(label), instance.0)
            }
            None => match self.struct_by_name(base) {
                Some((id, _)) => (0, id),
                None => return Err(unresolved(path)),
            },
        };

        for (idx, name) in fields.iter().enumerate() {
            let def = self.struct_def(current);
            let field = def.field(name).ok_or_else(|| {
                EvalError::Malformed(format!("struct `{}` has no field `{name}`", def.name))
            })?;
            let offset = field.offset.ok_or_else(|| {
                EvalError::Malformed(format!("layout of struct `{}` is unknown", def.name))
            })?;
            value += i64::from(offset);

            if idx + 1 < fields.len() {
                current = field.nested.ok_or_else(|| {
                    EvalError::Malformed(format!(
                        "field `{name}` of struct `{}` is not a struct",
                        def.name
                    ))
                })?;
            }
        }

        Ok(value)
    }

    /// Computes field offsets and lengths of every struct, nested structs first.
    pub fn resolve_struct_layouts(&mut self) -> Result<(), SymbolError> {
        let mut visits = vec![Visit::Pending; self.structs.len()];
        let mut stack = Vec::new();
        for idx in 0..self.structs.len() {
            self.layout_struct(idx, &mut visits, &mut stack)?;
        }
        Ok(())
    }

    fn layout_struct(
        &mut self,
        idx: usize,
        visits: &mut [Visit],
        stack: &mut Vec<usize>,
    ) -> Result<(), SymbolError> {
        match visits[idx] {
            Visit::Done => return Ok(()),
            Visit::InProgress => {
                let def = &self.structs[idx];
                let start = stack.iter().position(|&entry| entry == idx).unwrap_or(0);
                let cycle = stack[start..]
                    .iter()
                    .chain(std::iter::once(&idx))
                    .map(|&entry| self.structs[entry].name.as_str())
                    .collect::<Vec<_>>()
                    .join(" -> ");
                return Err(SymbolError::CyclicStruct {
                    name: def.name.clone(),
                    cycle,
                    file: def.file,
                    span: def.span.clone(),
                });
            }
            Visit::Pending => {}
        }

        visits[idx] = Visit::InProgress;
        stack.push(idx);

        let mut offset = 0u32;
        let mut byte_lengths = Vec::new();
        for field_idx in 0..self.structs[idx].fields.len() {
            let owner = self.structs[idx].name.clone();
            let field = self.structs[idx].fields[field_idx].clone();
            let count = parse_repeat_count(&field.count).map_err(|reason| {
                SymbolError::BadRepeatCount {
                    owner: owner.clone(),
                    text: field.count.clone(),
                    reason,
                    file: field.file,
                    span: field.span.clone(),
                }
            })?;

            let (width, nested) = match &field.kind {
                FieldKind::Byte => (1, None),
                FieldKind::Word => (2, None),
                FieldKind::Struct(name) => {
                    let nested = self.structs.get_index_of(name).ok_or_else(|| {
                        SymbolError::UnknownFieldType {
                            owner: owner.clone(),
                            kind: name.clone(),
                            file: field.file,
                            span: field.span.clone(),
                        }
                    })?;
                    self.layout_struct(nested, visits, stack)?;
                    (
                        self.structs[nested].byte_length.unwrap_or(0),
                        Some(nested),
                    )
                }
            };

            let end = width
                .checked_mul(count)
                .and_then(|size| offset.checked_add(size))
                .filter(|end| *end <= ADDRESS_SPACE)
                .ok_or_else(|| SymbolError::BadRepeatCount {
                    owner: owner.clone(),
                    text: field.count.clone(),
                    reason: "struct would not fit the 64 KiB address space".to_string(),
                    file: field.file,
                    span: field.span.clone(),
                })?;

            match nested {
                None => byte_lengths.extend(std::iter::repeat_n(width as u8, count as usize)),
                Some(nested) => {
                    let inner = &self.structs[nested].byte_lengths;
                    for _ in 0..count {
                        byte_lengths.extend_from_slice(inner);
                    }
                }
            }

            let slot = &mut self.structs[idx].fields[field_idx];
            slot.offset = Some(offset);
            slot.nested = nested.map(|nested| StructId(nested as u32));
            offset = end;
        }

        let def = &mut self.structs[idx];
        def.byte_length = Some(offset);
        def.byte_lengths = byte_lengths;
        visits[idx] = Visit::Done;
        stack.pop();
        Ok(())
    }

    /// Every pair of same-named labels whose addresses differ by less than `distance`.
    pub fn labels_too_close(&self, distance: u32) -> Vec<(&Label, &Label)> {
        if distance == 0 {
            return Vec::new();
        }
        let mut pairs = Vec::new();
        for ids in self.labels_by_name.values().filter(|ids| ids.len() > 1) {
            let mut bound: Vec<&Label> = ids
                .iter()
                .map(|&id| &self.labels[id])
                .filter(|label| label.address.is_some())
                .collect();
            bound.sort_by_key(|label| label.address);
            for (idx, first) in bound.iter().enumerate() {
                let lo = first.address.unwrap_or_default();
                for second in &bound[idx + 1..] {
                    let hi = second.address.unwrap_or_default();
                    if hi - lo >= distance {
                        break;
                    }
                    pairs.push((*first, *second));
                }
            }
        }
        pairs.sort_by_key(|(first, _)| first.address);
        pairs
    }

    /// Describes why `symbol` never resolved.
    pub fn explain_unresolved(&self, symbol: &str) -> String {
        let base = symbol
            .split('.')
            .find(|segment| !segment.is_empty())
            .unwrap_or(symbol);
        let name = if self.labels_by_name.contains_key(symbol) {
            symbol
        } else {
            base
        };
        match self.labels_by_name.get(name) {
            Some(ids) => {
                let unbound = ids
                    .iter()
                    .filter(|&&id| self.labels[id].address.is_none())
                    .count();
                format!(
                    "{unbound} of {} definition(s) of `{name}` never received an address",
                    ids.len()
                )
            }
            None if self.structs.contains_key(base) => {
                format!("`{symbol}` names struct `{base}` but could not be evaluated")
            }
            None => format!("no label or struct named `{base}` is defined"),
        }
    }

    fn nearest_label(&self, name: &str, anchor: u32) -> Result<Option<&Label>, EvalError> {
        let Some(ids) = self.labels_by_name.get(name) else {
            return Ok(None);
        };
        let mut best: Option<(&Label, u32)> = None;
        for &id in ids {
            let label = &self.labels[id];
            let address = label.address.ok_or_else(|| unresolved(name))?;
            let distance = address.abs_diff(anchor);
            if best.is_none_or(|(_, current)| distance < current) {
                best = Some((label, distance));
            }
        }
        Ok(best.map(|(label, _)| label))
    }
}

fn label_value(label: &Label) -> i64 {
    label.address.map(i64::from).unwrap_or_default()
}

fn unresolved(symbol: &str) -> EvalError {
    EvalError::Unresolved {
        symbol: symbol.to_string(),
    }
}

fn parse_repeat_count(text: &str) -> Result<u32, String> {
    let text = text.trim();
    if text == "?" {
        return Ok(1);
    }
    let head = match text.to_ascii_lowercase().find("dup") {
        Some(idx) => &text[..idx],
        None => text.split_whitespace().next().unwrap_or(""),
    };
    let value = eval_constant(head.trim()).map_err(|err| err.to_string())?;
    u32::try_from(value)
        .ok()
        .filter(|count| *count <= ADDRESS_SPACE)
        .ok_or_else(|| format!("{value} is not a valid count"))
}

#[cfg(test)]
mod tests {
    use super::{Field, FieldKind, StructDef, SymbolError, SymbolTable};
    use crate::{expr::EvalError, source::FileId};

    const FILE: FileId = FileId(0);

    fn field(name: &str, kind: &str, count: &str) -> Field {
        Field {
            name: Some(name.to_string()),
            kind: FieldKind::from_opcode(kind),
            count: count.to_string(),
            offset: None,
            nested: None,
            file: FILE,
            span: 0..0,
        }
    }

    fn declare(table: &mut SymbolTable, name: &str, fields: Vec<Field>) {
        let mut def = StructDef::new(name, FILE, 0..0);
        def.fields = fields;
        table.declare_struct(def).expect("declare failed");
    }

    #[test]
    fn lays_out_primitive_fields() {
        let mut table = SymbolTable::new();
        declare(&mut table, "Pair", vec![field("a", "fcb", "?"), field("b", "fdb", "?")]);
        table.resolve_struct_layouts().expect("layout failed");

        let (_, pair) = table.struct_by_name("Pair").expect("missing struct");
        assert_eq!(pair.byte_length, Some(3));
        assert_eq!(pair.byte_lengths, vec![1, 2]);
        assert_eq!(table.lookup("Pair.b", 0), Ok(1));
        assert_eq!(table.lookup("Pair", 0), Ok(0));
    }

    #[test]
    fn nested_structs_resolve_regardless_of_declaration_order() {
        let mut table = SymbolTable::new();
        declare(
            &mut table,
            "Actor",
            vec![field("id", "fcb", "?"), field("pos", "Point", "2 dup(?)"), field("hp", "fdb", "?")],
        );
        declare(&mut table, "Point", vec![field("x", "fcb", "?"), field("y", "fdb", "?")]);
        table.resolve_struct_layouts().expect("layout failed");

        let (_, actor) = table.struct_by_name("Actor").expect("missing struct");
        assert_eq!(actor.byte_length, Some(9));
        assert_eq!(actor.byte_lengths, vec![1, 1, 2, 1, 2, 2]);
        assert_eq!(table.lookup("Actor.pos.y", 0), Ok(2));
        assert_eq!(table.lookup("Actor.hp", 0), Ok(7));
    }

    #[test]
    fn cyclic_structs_are_rejected() {
        let mut table = SymbolTable::new();
        declare(&mut table, "A", vec![field("b", "B", "?")]);
        declare(&mut table, "B", vec![field("a", "A", "?")]);

        let err = table.resolve_struct_layouts().expect_err("cycle accepted");
        match err {
            SymbolError::CyclicStruct { cycle, .. } => assert_eq!(cycle, "A -> B -> A"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn duplicate_struct_names_are_rejected() {
        let mut table = SymbolTable::new();
        declare(&mut table, "A", vec![field("x", "fcb", "?")]);
        let err = table
            .declare_struct(StructDef::new("A", FILE, 0..0))
            .expect_err("duplicate accepted");
        assert!(matches!(err, SymbolError::DuplicateStruct { .. }));
    }

    #[test]
    fn binding_is_idempotent_and_fills_duplicates_in_order() {
        let mut table = SymbolTable::new();
        table.declare_label("loop", None, FILE, 0..0);
        table.declare_label("loop", None, FILE, 0..0);

        assert!(table.bind_label_address("loop", 0x10));
        assert!(table.bind_label_address("loop", 0x10));
        assert_eq!(
            table.lookup("loop", 0),
            Err(EvalError::Unresolved {
                symbol: "loop".into()
            })
        );
        assert!(table.bind_label_address("loop", 0x400));
        assert!(!table.bind_label_address("loop", 0x800));

        assert_eq!(table.lookup("loop", 0x20), Ok(0x10));
        assert_eq!(table.lookup("loop", 0x3F0), Ok(0x400));
    }

    #[test]
    fn instance_labels_add_field_offsets() {
        let mut table = SymbolTable::new();
        declare(&mut table, "Point", vec![field("x", "fdb", "?"), field("y", "fdb", "?")]);
        table.resolve_struct_layouts().expect("layout failed");
        table.declare_label("origin", Some("Point".into()), FILE, 0..0);
        table.declare_label("plain", None, FILE, 0..0);
        assert!(table.bind_label_address("origin", 0x2000));
        assert!(table.bind_label_address("plain", 0x3000));

        assert_eq!(table.lookup("origin.y", 0), Ok(0x2002));
        assert!(matches!(table.lookup("origin.z", 0), Err(EvalError::Malformed(_))));
        assert!(matches!(table.lookup("plain.x", 0), Err(EvalError::Malformed(_))));
        assert_eq!(
            table.lookup("nowhere", 0),
            Err(EvalError::Unresolved {
                symbol: "nowhere".into()
            })
        );
    }

    #[test]
    fn reports_close_duplicate_labels() {
        let mut table = SymbolTable::new();
        for _ in 0..3 {
            table.declare_label("skip", None, FILE, 0..0);
        }
        table.bind_label_address("skip", 0x100);
        table.bind_label_address("skip", 0x1FF);
        table.bind_label_address("skip", 0x1000);

        let pairs = table.labels_too_close(512);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0.address, Some(0x100));
        assert_eq!(pairs[0].1.address, Some(0x1FF));
        assert!(table.labels_too_close(0).is_empty());
    }

    #[test]
    fn reports_every_close_pair_not_just_neighbours() {
        let mut table = SymbolTable::new();
        for address in [0, 1, 2] {
            table.declare_label("loop", None, FILE, 0..0);
            table.bind_label_address("loop", address);
        }

        let pairs: Vec<(Option<u32>, Option<u32>)> = table
            .labels_too_close(512)
            .into_iter()
            .map(|(first, second)| (first.address, second.address))
            .collect();
        assert_eq!(
            pairs,
            vec![(Some(0), Some(1)), (Some(0), Some(2)), (Some(1), Some(2))]
        );
        assert_eq!(table.labels_too_close(2).len(), 2);
    }

    #[test]
    fn oversized_repeat_counts_are_rejected() {
        for count in ["65537 dup(?)", "4294967296 dup(?)"] {
            let mut table = SymbolTable::new();
            let mut def = StructDef::new("huge", FILE, 0..0);
            def.fields.push(field("data", "fdb", count));
            table.declare_struct(def).expect("declare");
            assert!(matches!(
                table.resolve_struct_layouts(),
                Err(SymbolError::BadRepeatCount { .. })
            ));
        }

        let mut table = SymbolTable::new();
        let mut inner = StructDef::new("page", FILE, 0..0);
        inner.fields.push(field("bytes", "fcb", "256 dup(?)"));
        table.declare_struct(inner).expect("declare");
        let mut outer = StructDef::new("bank", FILE, 0..0);
        outer.fields.push(field("pages", "page", "257 dup(?)"));
        table.declare_struct(outer).expect("declare");
        assert!(matches!(
            table.resolve_struct_layouts(),
            Err(SymbolError::BadRepeatCount { .. })
        ));
    }
}
