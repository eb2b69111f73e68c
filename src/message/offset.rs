// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fmt::{Display, Formatter};
use std::ops::{Add, AddAssign, Sub};

/// Logical position of a record in a log.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Offset(pub i64);

impl Offset {
    pub const fn new(value: i64) -> Self {
        Offset(value)
    }
    pub const fn value(self) -> i64 {
        self.0
    }
}

impl From<i64> for Offset {
    fn from(value: i64) -> Self {
        Offset(value)
    }
}

impl Add<i64> for Offset {
    type Output = Offset;

    fn add(self, delta: i64) -> Offset {
        Offset(self.0 + delta)
    }
}

impl AddAssign<i64> for Offset {
    fn add_assign(&mut self, delta: i64) {
        self.0 += delta;
    }
}

impl Sub for Offset {
    type Output = i64;

    fn sub(self, rhs: Offset) -> i64 {
        self.0 - rhs.0
    }
}

impl Display for Offset {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_arithmetic() {
        let mut o = Offset::new(10);
        o += 5;
        assert_eq!(o, Offset(15));
        assert_eq!(o + 1, Offset(16));
        assert_eq!(Offset(16) - Offset(10), 6);
        assert!(Offset(3) < Offset(4));
        assert_eq!(o.to_string(), "15");
    }
}
