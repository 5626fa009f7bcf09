use std::{fmt, str::FromStr};

use anyhow::{anyhow, Result};

/// Companies whose financial statements can be queried, in display order.
pub(crate) const TICKERS: [Ticker; 10] = [
    Ticker::Eqix,
    Ticker::Frt,
    Ticker::Para,
    Ticker::Pcg,
    Ticker::Pgr,
    Ticker::Trow,
    Ticker::Txt,
    Ticker::Unh,
    Ticker::Wtw,
    Ticker::Wynn,
];

const FIRST_YEAR: u16 = 2010;
const LAST_YEAR: u16 = 2019;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Ticker {
    Eqix,
    Frt,
    Para,
    Pcg,
    Pgr,
    Trow,
    Txt,
    Unh,
    Wtw,
    Wynn,
}

impl Ticker {
    pub(crate) fn symbol(self) -> &'static str {
        match self {
            Ticker::Eqix => "EQIX",
            Ticker::Frt => "FRT",
            Ticker::Para => "PARA",
            Ticker::Pcg => "PCG",
            Ticker::Pgr => "PGR",
            Ticker::Trow => "TROW",
            Ticker::Txt => "TXT",
            Ticker::Unh => "UNH",
            Ticker::Wtw => "WTW",
            Ticker::Wynn => "WYNN",
        }
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Ticker {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        TICKERS
            .iter()
            .copied()
            .find(|t| t.symbol() == s)
            .ok_or_else(|| anyhow!("unknown ticker: {s}"))
    }
}

/// A fiscal year inside the supported range.
///
/// The only way to obtain a `Year` is through [`years`] or [`FromStr`], so an
/// out-of-range year cannot be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct Year(u16);

impl Year {
    pub(crate) fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for Year {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Year {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let year: u16 = s.trim().parse()?;
        if (FIRST_YEAR..=LAST_YEAR).contains(&year) {
            Ok(Year(year))
        } else {
            Err(anyhow!("year out of range: {year}"))
        }
    }
}

pub(crate) fn years() -> impl DoubleEndedIterator<Item = Year> + ExactSizeIterator {
    (FIRST_YEAR..=LAST_YEAR).map(Year)
}
