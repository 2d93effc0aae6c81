/// Stores a type in SQLite as `TEXT`, using its `Display` and `FromStr` implementations.
///
/// SQLite has no decimal or UUID column types. Values are stored in their canonical string form, which keeps ids
/// joinable and readable from the SQL views.
#[macro_export]
macro_rules! sql_text {
    ($for_type:ty) => {
        impl sqlx::Type<sqlx::Sqlite> for $for_type {
            fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
                <String as sqlx::Type<sqlx::Sqlite>>::type_info()
            }

            fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
                <String as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for $for_type {
            fn encode_by_ref(
                &self,
                buf: &mut <sqlx::Sqlite as sqlx::database::HasArguments<'q>>::ArgumentBuffer,
            ) -> sqlx::encode::IsNull {
                <String as sqlx::Encode<'q, sqlx::Sqlite>>::encode(self.to_string(), buf)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for $for_type {
            fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
                let text = <&str as sqlx::Decode<'r, sqlx::Sqlite>>::decode(value)?;
                let parsed = text.parse::<$for_type>()?;
                Ok(parsed)
            }
        }
    };
}
