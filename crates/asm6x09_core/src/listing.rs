//! Assembly listing: address, emitted bytes and the source statement per line,
//! followed by the label table.

use pretty::{Arena, DocAllocator, DocBuilder};

use crate::{asm::Assembly, line::Line, source::SourceManager};

const LISTING_WIDTH: usize = 100;
const BYTES_PER_ROW: usize = 4;
const LABEL_COLUMN: usize = 16;
const OPCODE_COLUMN: usize = 8;
/// Source-line number, address and byte columns ahead of the statement.
const PREFIX_WIDTH: usize = 6 + 6 + BYTES_PER_ROW * 3 + 1;

type Doc<'a> = DocBuilder<'a, Arena<'a>>;

pub fn render_listing(source_manager: &SourceManager, assembly: &Assembly) -> String {
    let arena = Arena::new();
    let mut rows = Vec::with_capacity(assembly.lines.len() + 2);
    for line in &assembly.lines {
        rows.push(doc_line(&arena, source_manager, line));
    }

    rows.push(arena.nil());
    rows.push(arena.text(format!("; {} labels", assembly.symbols.labels().len())));
    let mut labels: Vec<_> = assembly.symbols.labels().iter().collect();
    labels.sort_by_key(|label| (label.address, label.name.clone()));
    for label in labels {
        let address = label
            .address
            .map_or_else(|| "????".to_string(), |address| format!("{address:04X}"));
        rows.push(arena.text(format!("{:<LABEL_COLUMN$} {address}", label.name)));
    }

    let doc = arena
        .intersperse(rows, arena.hardline())
        .append(arena.hardline());
    render_doc(doc)
}

fn render_doc(doc: Doc<'_>) -> String {
    let mut out = String::new();
    match doc.render_fmt(LISTING_WIDTH, &mut out) {
        Ok(()) => out,
        Err(_) => String::new(),
    }
}

fn doc_line<'a>(arena: &'a Arena<'a>, source_manager: &SourceManager, line: &Line) -> Doc<'a> {
    let (number, _) = source_manager.file(line.file).line_col(line.span.start);
    let address = line
        .address
        .filter(|_| line.opcode.is_some() || line.label.is_some())
        .map_or_else(|| "    ".to_string(), |address| format!("{address:04X}"));

    let mut chunks = line.data.chunks(BYTES_PER_ROW);
    let first = chunks.next().map(hex_bytes).unwrap_or_default();
    let head = arena.text(format!(
        "{number:>5} {address}  {first:<width$} ",
        width = BYTES_PER_ROW * 3
    ));

    let mut doc = head.append(doc_statement(arena, line));
    let mut offset = line.address.unwrap_or_default();
    for chunk in chunks {
        offset += BYTES_PER_ROW as u32;
        doc = doc
            .append(arena.hardline())
            .append(arena.text(format!("      {offset:04X}  {}", hex_bytes(chunk))));
    }
    doc
}

fn doc_statement<'a>(arena: &'a Arena<'a>, line: &Line) -> Doc<'a> {
    let label = arena.text(format!("{:<LABEL_COLUMN$}", line.label_text().unwrap_or("")));
    let Some(opcode) = line.opcode_text() else {
        return label;
    };
    let head = label.append(arena.text(format!(" {opcode:<OPCODE_COLUMN$}")));
    let operand = line.operand_text();
    if operand.is_empty() {
        return head;
    }

    let items = split_items(operand).into_iter().map(|item| arena.text(item));
    let joined = arena
        .intersperse(items, arena.text(",").append(arena.line_()))
        .group()
        .nest((PREFIX_WIDTH + LABEL_COLUMN + OPCODE_COLUMN + 2) as isize);
    head.append(arena.space()).append(joined)
}

/// Splits on commas outside string literals so long data lines can wrap.
fn split_items(operand: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in operand.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            ',' if !quoted => items.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    items.push(current);
    items
}

fn hex_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|byte| format!("{byte:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::{render_listing, split_items};
    use crate::{AssembleOptions, asm::assemble, lex::lex_lines, source::SourceManager};

    #[test]
    fn splits_items_outside_strings() {
        assert_eq!(split_items("\"a,b\",1"), vec!["\"a,b\"", "1"]);
        assert_eq!(split_items("5,x"), vec!["5", "x"]);
    }

    #[test]
    fn lists_addresses_bytes_and_labels() {
        let mut manager = SourceManager::new();
        let file = manager.add_virtual_file(
            "t.asm",
            " .cpu 6809\nstart lda #$12\n fcb 1,2,3,4,5,6\n bra start\n",
        );
        let (lines, _) = lex_lines(&manager, file);
        let assembly = assemble(lines, &AssembleOptions::default()).expect("assembly failed");
        let listing = render_listing(&manager, &assembly);

        let rows: Vec<&str> = listing.lines().collect();
        assert!(rows[1].contains("0000  86 12"), "{listing}");
        assert!(rows[1].contains("start"));
        assert!(rows[2].contains("0002  01 02 03 04"), "{listing}");
        assert!(rows[3].contains("0006  05 06"), "{listing}");
        assert!(rows[4].contains("0008  20 F6"), "{listing}");
        assert!(listing.contains("start            0000"), "{listing}");
    }
}
