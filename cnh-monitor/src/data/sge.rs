//! Shanghai Gold Exchange HTML quote page adapter.
//!
//! The exchange publishes delayed quotes as an HTML table, one row per
//! instrument. The row is found by a cell whose text names the instrument
//! (e.g. "Au99.99"); the price is the next non-empty cell in that row.

use async_trait::async_trait;
use cnh_common::SgeSourceConfig;
use scraper::{ElementRef, Html, Selector};

use super::source::{QuoteSource, SourceError};
use super::Signal;

/// Locate `instrument` in the page's tables and return its price.
///
/// Rows whose cell equals the instrument label are preferred over rows that
/// merely contain it, so "Au99.99" is not confused with "iAu99.99".
pub fn parse_sge_table(html: &str, instrument: &str) -> Result<f64, SourceError> {
    let document = Html::parse_document(html);
    let row_selector = selector("tr")?;
    let cell_selector = selector("td, th")?;

    let rows: Vec<Vec<String>> = document
        .select(&row_selector)
        .map(|row| {
            row.select(&cell_selector)
                .map(|cell| cell_text(&cell))
                .collect()
        })
        .collect();

    let exact = |cell: &str| cell == instrument;
    let partial = |cell: &str| cell.contains(instrument);

    let mut last_error = None;
    for is_label in [&exact as &dyn Fn(&str) -> bool, &partial] {
        for cells in &rows {
            let Some(label_idx) = cells.iter().position(|c| is_label(c.as_str())) else {
                continue;
            };

            match price_after(cells, label_idx) {
                Ok(price) => return Ok(price),
                Err(e) => last_error = Some(e),
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        SourceError::Malformed(format!("instrument {} not found in quote table", instrument))
    }))
}

fn selector(css: &str) -> Result<Selector, SourceError> {
    Selector::parse(css).map_err(|e| SourceError::Malformed(format!("invalid selector {}: {:?}", css, e)))
}

fn cell_text(cell: &ElementRef<'_>) -> String {
    cell.text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn price_after(cells: &[String], label_idx: usize) -> Result<f64, SourceError> {
    let raw = cells[label_idx + 1..]
        .iter()
        .find(|c| !c.is_empty())
        .ok_or_else(|| SourceError::Malformed("no cell after instrument label".into()))?;

    raw.replace(',', "")
        .parse::<f64>()
        .map_err(|e| SourceError::Malformed(format!("price cell {:?}: {}", raw, e)))
}

/// Shanghai gold scraped from the exchange's quote page.
pub struct SgeHtmlSource {
    client: reqwest::Client,
    url: String,
    instrument: String,
}

impl SgeHtmlSource {
    pub fn new(client: reqwest::Client, config: &SgeSourceConfig) -> Self {
        Self {
            client,
            url: config.url.clone(),
            instrument: config.instrument.clone(),
        }
    }
}

#[async_trait]
impl QuoteSource for SgeHtmlSource {
    fn name(&self) -> &'static str {
        "sge"
    }

    fn signal(&self) -> Signal {
        Signal::ShanghaiGold
    }

    async fn fetch_value(&self) -> Result<f64, SourceError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(SourceError::from_reqwest)?;

        let response = SourceError::check_status(response)?;
        let bytes = response.bytes().await.map_err(SourceError::from_reqwest)?;
        parse_sge_table(&String::from_utf8_lossy(&bytes), &self.instrument)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <table class="ft14">
            <tr><th>合约</th><th>最新价</th><th>最高价</th><th>最低价</th></tr>
            <tr><td>iAu99.99</td><td>615.10</td><td>616.00</td><td>610.00</td></tr>
            <tr><td> Au99.99 </td><td>612.35</td><td>614.00</td><td>609.80</td></tr>
            <tr><td>Au(T+D)</td><td>1,611.00</td><td>613.50</td><td>608.90</td></tr>
          </table>
        </body></html>
    "#;

    #[test]
    fn test_exact_label_preferred() {
        assert_eq!(parse_sge_table(PAGE, "Au99.99").unwrap(), 612.35);
    }

    #[test]
    fn test_partial_label_and_thousands_separator() {
        assert_eq!(parse_sge_table(PAGE, "T+D").unwrap(), 1611.0);
    }

    #[test]
    fn test_skips_empty_cells() {
        let page = "<table><tr><td><span>Au99.99</span></td><td> </td><td>607.2</td></tr></table>";
        assert_eq!(parse_sge_table(page, "Au99.99").unwrap(), 607.2);
    }

    #[test]
    fn test_missing_instrument() {
        let err = parse_sge_table(PAGE, "Ag99.99").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_non_numeric_price() {
        let page = "<table><tr><td>Au99.99</td><td>停牌</td></tr></table>";
        assert!(matches!(parse_sge_table(page, "Au99.99"), Err(SourceError::Malformed(_))));
    }
}
