use std::fmt;

use super::{check_columns, check_edit_base, AlignColumn, ClassifyError, GlobalAligner};
use crate::sequence::{EditCount, Fragment};
use crate::template::Template;

/// Column-aligned text rendering of a fragment against every template variant.
///
/// Each edit site is padded with `-` up to the largest count seen at that
/// site so backbone characters line up vertically across rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentView {
    templates: Vec<String>,
    fragment: String,
}

impl AlignmentView {
    /// Align `fragment` to `template` and render one row per variant plus
    /// the fragment row.
    pub fn build<A>(fragment: &Fragment, template: &Template, aligner: &mut A) -> Result<Self, ClassifyError>
    where
        A: GlobalAligner + ?Sized,
    {
        let seq = fragment.sequence();
        check_edit_base(seq, template)?;
        let columns = aligner.align(template.backbone(), seq.backbone());
        check_columns(&columns, template.backbone().len(), seq.len())?;

        let edit = template.edit_base() as char;
        let frag_bases = seq.backbone();
        let frag_sites = seq.edit_sites();
        let tmpl_bases = template.backbone();
        let mut templates = vec![String::new(); template.size()];
        let mut frag_row = String::new();

        let (mut fi, mut ti) = (0usize, 0usize);
        for column in &columns {
            match column {
                AlignColumn::TemplateGap => {
                    let width = frag_sites[fi];
                    for row in templates.iter_mut() {
                        write_site(row, edit, 0, width);
                        row.push('-');
                    }
                    write_site(&mut frag_row, edit, width, width);
                    frag_row.push(frag_bases[fi] as char);
                    fi += 1;
                }
                AlignColumn::FragmentGap => {
                    let width = template.max_count(ti);
                    for (row, variant) in templates.iter_mut().zip(template.variants()) {
                        write_site(row, edit, variant[ti], width);
                        row.push(tmpl_bases[ti] as char);
                    }
                    write_site(&mut frag_row, '-', 0, width);
                    frag_row.push('-');
                    ti += 1;
                }
                AlignColumn::Paired => {
                    let width = template.max_count(ti).max(frag_sites[fi]);
                    for (row, variant) in templates.iter_mut().zip(template.variants()) {
                        write_site(row, edit, variant[ti], width);
                        row.push(tmpl_bases[ti] as char);
                    }
                    write_site(&mut frag_row, edit, frag_sites[fi], width);
                    frag_row.push(frag_bases[fi] as char);
                    fi += 1;
                    ti += 1;
                }
            }
        }

        // The trailing site carries edit bases only.
        let width = template.max_count(ti).max(frag_sites[fi]);
        for (row, variant) in templates.iter_mut().zip(template.variants()) {
            write_site(row, edit, variant[ti], width);
        }
        write_site(&mut frag_row, edit, frag_sites[fi], width);

        Ok(Self {
            templates,
            fragment: frag_row,
        })
    }

    /// Rendered template variants, FE first.
    pub fn template_rows(&self) -> &[String] {
        &self.templates
    }

    /// Rendered fragment row.
    pub fn fragment_row(&self) -> &str {
        &self.fragment
    }
}

impl fmt::Display for AlignmentView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.templates {
            writeln!(f, "{row}")?;
        }
        write!(f, "{}", self.fragment)
    }
}

fn write_site(out: &mut String, base: char, count: EditCount, width: EditCount) {
    out.extend(std::iter::repeat('-').take(width.saturating_sub(count) as usize));
    out.extend(std::iter::repeat(base).take(count as usize));
}
