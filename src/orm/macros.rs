/// Implements [`Record`](crate::orm::Record) for a struct.
///
/// Column names are the field names. Optional sections must appear in the
/// order shown and each ends with a trailing comma.
///
/// ```ignore
/// record! {
///     Author in "author" {
///         columns: [id, name, role_id],
///         methods: [display_name],
///         has_one: [role: Role => role_id = id],
///         has_many: [entries: Entry => id = author_id],
///     }
/// }
/// ```
///
/// `has_one` fields are `Option<Box<R>>`; `has_many` fields are `Vec<R>` or
/// `Vec<Box<R>>`. In `local = foreign`, `local` is a column of the declaring
/// record and `foreign` a column of the related one.
#[macro_export]
macro_rules! record {
    (
        $ty:ident in $table:literal {
            columns: [$($column:ident),* $(,)?],
            $(methods: [$($method:ident),* $(,)?],)?
            $(has_one: [$($one:ident : $one_ty:ty => $one_local:ident = $one_foreign:ident),* $(,)?],)?
            $(has_many: [$($many:ident : $many_ty:ty => $many_local:ident = $many_foreign:ident),* $(,)?],)?
        }
    ) => {
        impl $crate::orm::Record for $ty {
            const TABLE: &'static str = $table;

            fn describe(table: &mut $crate::orm::TableBuilder<Self>) {
                $(
                    table.column(stringify!($column), |r| &r.$column, |r| &mut r.$column);
                )*
                $($(
                    table.method(stringify!($method), |r, b, quote| {
                        $crate::types::ColumnValue::append_value(&r.$method(), b, quote)
                    });
                )*)?
                $($(
                    table.has_one::<$one_ty>(
                        stringify!($one),
                        stringify!($one_local),
                        stringify!($one_foreign),
                        |r| &r.$one,
                        |r| &mut r.$one,
                    );
                )*)?
                $($(
                    table.has_many::<$many_ty, _>(
                        stringify!($many),
                        stringify!($many_local),
                        stringify!($many_foreign),
                        |r| &r.$many,
                        |r| &mut r.$many,
                    );
                )*)?
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::orm::{RelationKind, Registry};

    #[derive(Debug, Clone, Default)]
    struct Role {
        id: i64,
        name: String,
    }

    crate::record! {
        Role in "role" {
            columns: [id, name],
        }
    }

    #[derive(Debug, Clone, Default)]
    struct Member {
        id: i64,
        first: String,
        last: String,
        role_id: i64,
        role: Option<Box<Role>>,
        mentees: Vec<Member>,
    }

    impl Member {
        fn full_name(&self) -> String {
            format!("{} {}", self.first, self.last)
        }
    }

    crate::record! {
        Member in "member" {
            columns: [id, first, last, role_id,],
            methods: [full_name],
            has_one: [role: Role => role_id = id],
            has_many: [mentees: Member => id = role_id],
        }
    }

    #[test]
    fn test_generated_metadata() {
        let registry = Registry::new();
        let table = registry.table::<Member>().unwrap();

        assert_eq!(table.name(), "member");
        assert_eq!(table.columns().len(), 4);
        assert!(table.method("full_name").is_some());
        assert_eq!(table.relation_kind("role"), Some(RelationKind::HasOne));
        assert_eq!(table.relation_kind("mentees"), Some(RelationKind::HasMany));
        assert_eq!(table.relation_kind("first"), None);
    }

    #[test]
    fn test_generated_method_column() {
        let registry = Registry::new();
        let table = registry.table::<Member>().unwrap();
        let member = Member {
            first: "Ada".to_string(),
            last: "Lovelace".to_string(),
            ..Member::default()
        };

        let mut b = Vec::new();
        table.method("full_name").unwrap().append_value(&mut b, &member, true);
        assert_eq!(b, b"'Ada Lovelace'");
    }
}
