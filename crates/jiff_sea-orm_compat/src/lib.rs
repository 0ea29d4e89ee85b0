use sea_orm::{
    ColumnType, TryGetable, Value,
    sea_query::{ArrayType, Nullable, ValueType, ValueTypeErr},
};

/// Storage type for a [`jiff::Timestamp`] which will store the timestamp as a
/// BIGINTEGER representing milliseconds since the UNIX epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct JiffTimestampMilliseconds(pub jiff::Timestamp);

impl From<JiffTimestampMilliseconds> for Value {
    fn from(JiffTimestampMilliseconds(timestamp): JiffTimestampMilliseconds) -> Self {
        Value::BigInt(Some(timestamp.as_millisecond()))
    }
}

impl Nullable for JiffTimestampMilliseconds {
    fn null() -> Value {
        Value::BigInt(None)
    }
}

impl ValueType for JiffTimestampMilliseconds {
    fn try_from(v: Value) -> Result<Self, ValueTypeErr> {
        match v {
            Value::BigInt(Some(x)) => jiff::Timestamp::from_millisecond(x)
                .map_err(|_e| ValueTypeErr)
                .map(JiffTimestampMilliseconds),
            _ => Err(ValueTypeErr),
        }
    }

    fn type_name() -> String {
        "JiffTimestampMilliseconds".to_owned()
    }

    fn array_type() -> ArrayType {
        ArrayType::BigInt
    }

    fn column_type() -> ColumnType {
        ColumnType::BigInteger
    }
}

impl TryGetable for JiffTimestampMilliseconds {
    fn try_get_by<I: sea_orm::ColIdx>(
        res: &sea_orm::QueryResult,
        index: I,
    ) -> Result<Self, sea_orm::TryGetError> {
        i64::try_get_by(res, index).and_then(|int| {
            jiff::Timestamp::from_millisecond(int)
                .map_err(|e| {
                    sea_orm::TryGetError::DbErr(sea_orm::DbErr::TryIntoErr {
                        from: "i64",
                        into: "jiff::Timestamp",
                        source: Box::new(e),
                    })
                })
                .map(JiffTimestampMilliseconds)
        })
    }
}

/// Storage type for an `Option<jiff::Timestamp>`, so nullable timestamp columns
/// (lease expiry, last-attempt-at, last-polled-at, ...) don't need a second
/// hand-rolled wrapper per column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct JiffTimestampMillisecondsOpt(pub Option<jiff::Timestamp>);

impl From<JiffTimestampMillisecondsOpt> for Value {
    fn from(JiffTimestampMillisecondsOpt(timestamp): JiffTimestampMillisecondsOpt) -> Self {
        Value::BigInt(timestamp.map(|t| t.as_millisecond()))
    }
}

impl Nullable for JiffTimestampMillisecondsOpt {
    fn null() -> Value {
        Value::BigInt(None)
    }
}

impl ValueType for JiffTimestampMillisecondsOpt {
    fn try_from(v: Value) -> Result<Self, ValueTypeErr> {
        match v {
            Value::BigInt(None) => Ok(JiffTimestampMillisecondsOpt(None)),
            Value::BigInt(Some(x)) => jiff::Timestamp::from_millisecond(x)
                .map_err(|_e| ValueTypeErr)
                .map(|t| JiffTimestampMillisecondsOpt(Some(t))),
            _ => Err(ValueTypeErr),
        }
    }

    fn type_name() -> String {
        "JiffTimestampMillisecondsOpt".to_owned()
    }

    fn array_type() -> ArrayType {
        ArrayType::BigInt
    }

    fn column_type() -> ColumnType {
        ColumnType::BigInteger
    }
}

impl TryGetable for JiffTimestampMillisecondsOpt {
    fn try_get_by<I: sea_orm::ColIdx>(
        res: &sea_orm::QueryResult,
        index: I,
    ) -> Result<Self, sea_orm::TryGetError> {
        Option::<i64>::try_get_by(res, index).map(|maybe_int| {
            JiffTimestampMillisecondsOpt(maybe_int.and_then(|int| {
                jiff::Timestamp::from_millisecond(int).ok()
            }))
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trips_through_value() {
        let stamp = JiffTimestampMilliseconds(jiff::Timestamp::from_second(1_700_000_000).unwrap());
        let value: Value = stamp.into();
        assert_eq!(
            JiffTimestampMilliseconds::try_from(value).unwrap().0,
            stamp.0
        );
    }

    #[test]
    fn opt_none_round_trips() {
        let stamp = JiffTimestampMillisecondsOpt(None);
        let value: Value = stamp.into();
        assert_eq!(JiffTimestampMillisecondsOpt::try_from(value).unwrap().0, None);
    }
}
