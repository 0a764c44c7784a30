/// BACnet date. Any field may hold [`Date::WILDCARD`] to match anything;
/// month additionally allows 13 (odd months) and 14 (even months), and day
/// allows 32 (last day of month).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Date {
    pub year_since_1900: u8,
    pub month: u8,
    pub day: u8,
    pub weekday: u8,
}

impl Date {
    pub const WILDCARD: u8 = 0xFF;
    pub const MONTH_ODD: u8 = 13;
    pub const MONTH_EVEN: u8 = 14;
    pub const DAY_LAST: u8 = 32;

    pub const fn any() -> Self {
        Self {
            year_since_1900: Self::WILDCARD,
            month: Self::WILDCARD,
            day: Self::WILDCARD,
            weekday: Self::WILDCARD,
        }
    }

    pub const fn has_wildcard(&self) -> bool {
        self.year_since_1900 == Self::WILDCARD
            || self.month == Self::WILDCARD
            || self.day == Self::WILDCARD
            || self.weekday == Self::WILDCARD
    }

    /// Whether this (possibly wildcarded) date matches a fully-specified one.
    pub fn matches(&self, concrete: &Date) -> bool {
        let month_ok = match self.month {
            Self::WILDCARD => true,
            Self::MONTH_ODD => concrete.month % 2 == 1,
            Self::MONTH_EVEN => concrete.month % 2 == 0,
            m => m == concrete.month,
        };
        let day_ok = match self.day {
            Self::WILDCARD => true,
            Self::DAY_LAST => concrete.day == days_in_month(concrete.year_since_1900, concrete.month),
            d => d == concrete.day,
        };
        (self.year_since_1900 == Self::WILDCARD || self.year_since_1900 == concrete.year_since_1900)
            && month_ok
            && day_ok
            && (self.weekday == Self::WILDCARD || self.weekday == concrete.weekday)
    }
}

/// BACnet time with hundredths resolution. Fields may hold 0xFF wildcards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Time {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub hundredths: u8,
}

impl Time {
    pub const WILDCARD: u8 = 0xFF;

    pub const fn any() -> Self {
        Self {
            hour: Self::WILDCARD,
            minute: Self::WILDCARD,
            second: Self::WILDCARD,
            hundredths: Self::WILDCARD,
        }
    }

    pub const fn has_wildcard(&self) -> bool {
        self.hour == Self::WILDCARD
            || self.minute == Self::WILDCARD
            || self.second == Self::WILDCARD
            || self.hundredths == Self::WILDCARD
    }
}

fn days_in_month(year_since_1900: u8, month: u8) -> u8 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            let year = 1900 + year_since_1900 as u16;
            if year % 4 == 0 && (year % 100 != 0 || year % 400 == 0) {
                29
            } else {
                28
            }
        }
        _ => 31,
    }
}

#[cfg(test)]
mod tests {
    use super::Date;

    fn concrete(year: u8, month: u8, day: u8, weekday: u8) -> Date {
        Date {
            year_since_1900: year,
            month,
            day,
            weekday,
        }
    }

    #[test]
    fn wildcard_matches_everything() {
        assert!(Date::any().matches(&concrete(124, 6, 15, 3)));
    }

    #[test]
    fn odd_even_months() {
        let odd = Date {
            month: Date::MONTH_ODD,
            ..Date::any()
        };
        assert!(odd.matches(&concrete(124, 3, 1, 5)));
        assert!(!odd.matches(&concrete(124, 4, 1, 6)));

        let even = Date {
            month: Date::MONTH_EVEN,
            ..Date::any()
        };
        assert!(even.matches(&concrete(124, 4, 1, 6)));
    }

    #[test]
    fn last_day_of_month() {
        let last = Date {
            day: Date::DAY_LAST,
            ..Date::any()
        };
        assert!(last.matches(&concrete(124, 2, 29, 4)));
        assert!(last.matches(&concrete(123, 2, 28, 2)));
        assert!(!last.matches(&concrete(123, 2, 27, 1)));
    }
}
