use error_stack::{Context, Report};

/// Figment errors pack the failing key and source into one value;
/// this spreads them over report attachments instead.
pub trait FigmentErrorAttachable<T: Context> {
    fn attach_figment_error(self, err: figment::Error) -> Report<T>;
}

impl<T: Context> FigmentErrorAttachable<T> for Report<T> {
    fn attach_figment_error(self, error: figment::Error) -> Report<T> {
        let mut report = self;
        for e in error {
            report = report.attach_printable(e.kind.to_string());

            if let (Some(profile), Some(md)) = (&e.profile, &e.metadata) {
                if !e.path.is_empty() {
                    let key = md.interpolate(profile, &e.path);
                    report = report.attach_printable(format!("for key {key:?}"));
                }
            }

            if let Some(md) = &e.metadata {
                match &md.source {
                    Some(source) => {
                        report = report.attach_printable(format!("in {source} {}", md.name));
                    }
                    None => report = report.attach_printable(format!("in {}", md.name)),
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thiserror::Error;

    #[derive(Debug, Error)]
    #[error("oops")]
    struct Oops;

    #[test]
    fn attaches_the_failing_key() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("FOLLOW_DB_POOL_SIZE", "zero");
            jail.set_env("DATABASE_URL", "postgres://localhost");

            let Err(error) = crate::config::Config::figment().extract::<crate::config::Config>()
            else {
                panic!("pool size should not parse");
            };

            let report = Report::new(Oops).attach_figment_error(error);
            let output = format!("{report:?}").to_lowercase();
            assert!(output.contains("pool_size"), "{output}");
            Ok(())
        });
    }
}
