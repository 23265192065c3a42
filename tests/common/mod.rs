#![allow(dead_code)]

use async_trait::async_trait;
use excel_analytics::insights::{GenerationError, TextGenerator};
use rust_xlsxwriter::{ExcelDateTime, Format, Workbook, Worksheet};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Cell content for fixture workbooks
#[derive(Clone, Debug)]
pub enum Fx {
    Text(&'static str),
    Num(f64),
    Date(u16, u8, u8),
    Blank,
}

/// Build an xlsx workbook with one sheet holding `header` and `rows`
pub fn workbook(header: &[&str], rows: &[Vec<Fx>]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    let mut sheet = Worksheet::new();
    let date_format = Format::new().set_num_format("yyyy-mm-dd");

    for (c, name) in header.iter().enumerate() {
        if !name.is_empty() {
            sheet.write_string(0, c as u16, *name).unwrap();
        }
    }

    for (r, row) in rows.iter().enumerate() {
        for (c, cell) in row.iter().enumerate() {
            let (r, c) = ((r + 1) as u32, c as u16);
            match cell {
                Fx::Text(s) => {
                    sheet.write_string(r, c, *s).unwrap();
                }
                Fx::Num(n) => {
                    sheet.write_number(r, c, *n).unwrap();
                }
                Fx::Date(y, m, d) => {
                    let date = ExcelDateTime::from_ymd(*y, *m, *d).unwrap();
                    sheet
                        .write_datetime_with_format(r, c, &date, &date_format)
                        .unwrap();
                }
                Fx::Blank => {}
            }
        }
    }

    workbook.push_worksheet(sheet);
    workbook.save_to_buffer().unwrap()
}

/// Sales by region, four data rows
pub fn sales_workbook() -> Vec<u8> {
    workbook(
        &["Region", "Sales", "Units"],
        &[
            vec![Fx::Text("North"), Fx::Num(100.0), Fx::Num(10.0)],
            vec![Fx::Text("South"), Fx::Num(250.0), Fx::Text("12")],
            vec![Fx::Text("East"), Fx::Num(175.5), Fx::Blank],
            vec![Fx::Text("West"), Fx::Text("n/a"), Fx::Num(8.0)],
        ],
    )
}

/// Generator that replays a fixed script of results and counts calls
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<String, GenerationError>>>,
    pub calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new(script: Vec<Result<String, GenerationError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Generator that always answers with `text`
    pub fn always(text: &str) -> Self {
        Self::new(vec![Ok(text.to_string()); 32])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(GenerationError::EmptyResponse))
    }
}

pub const TWO_SECTIONS: &str = "**1. Key Trends and Patterns:**\nSales increased 20% over the quarter. Recommendation: expand inventory before Q4.\n\n**2. Correlations between Variables:**\nUnits and Sales move together.\n";
