pub mod date_time {
    use chrono::{DateTime, Local, NaiveDateTime, TimeZone as _};
    use serde::{
        de::{self, Error, IntoDeserializer},
        Deserialize as _, Deserializer,
    };

    pub fn deserialize_local<'de, D>(
        deserializer: D,
    ) -> Result<DateTime<Local>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let naive_datetime = NaiveDateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M:%S")
            .map_err(Error::custom)?;
        Local
            .from_local_datetime(&naive_datetime)
            .single()
            .ok_or_else(|| de::Error::custom("invalid local datetime"))
    }

    pub fn deserialize_local_option<'de, D>(
        deserializer: D,
    ) -> Result<Option<DateTime<Local>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = Option::<String>::deserialize(deserializer)?;
        match s {
            Some(s) => deserialize_local(s.as_str().into_deserializer()).map(Some),
            None => Ok(None),
        }
    }
}

/// `HH:MM` wall-clock time, used for the weekly schedule windows. Kept
/// separate from `chrono::NaiveTime`'s own serde support because the wire
/// format intentionally drops seconds.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{de::Error as DeError, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&s, "%H:%M").map_err(DeError::custom)
    }

    pub fn serialize_option<S>(
        time: &Option<NaiveTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match time {
            Some(t) => serialize(t, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize_option<'de, D>(
        deserializer: D,
    ) -> Result<Option<NaiveTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = Option::<String>::deserialize(deserializer)?;
        s.map(|s| NaiveTime::parse_from_str(&s, "%H:%M").map_err(DeError::custom))
            .transpose()
    }
}
