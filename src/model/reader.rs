// mcinv-param/src/model/reader.rs

use super::errors::ModelLoadError;
use super::group::Parameterization;
use super::model::LayeredModel;
use log::debug;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

/// Read a grouped model from its text form, one line per group:
///
/// ```text
/// id flag thickness control_point_count coeff... [ratio...] vp_vs
/// ```
///
/// `flag` is 1 for explicit layers, 2 for B-splines, 4 for a gradient
/// layer and 5 for water. Layered groups carry one ratio per coefficient.
/// Any malformed line aborts the load; nothing is partially applied.
pub fn load_model_txt(filename: &PathBuf) -> Result<LayeredModel, ModelLoadError> {
    let contents = fs::read_to_string(filename)?;
    let lines: Vec<(usize, &str)> = contents
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l))
        .filter(|(_, l)| !l.trim().is_empty())
        .collect();
    let nmod = lines.len();
    debug!("reading {} model parameter groups", nmod);

    let mut model = LayeredModel::new();
    model.initialize(nmod);
    for (line, text) in lines {
        let fields: Vec<&str> = text.split_whitespace().collect();
        if fields.len() < 4 {
            return Err(ModelLoadError::TruncatedLine {
                line,
                found: fields.len(),
            });
        }
        let id: usize = parse_field(line, 1, fields[0])?;
        let flag: i64 = parse_field(line, 2, fields[1])?;
        let parameterization = Parameterization::from_flag(flag)
            .ok_or(ModelLoadError::UnknownTypeFlag { line, flag })?;
        let thickness: f64 = parse_field(line, 3, fields[2])?;
        let tnp: usize = parse_field(line, 4, fields[3])?;

        let expected = match parameterization {
            Parameterization::Layered => 4 + 2 * tnp + 1,
            _ => 4 + tnp + 1,
        };
        if fields.len() != expected {
            return Err(ModelLoadError::FieldCount {
                line,
                expected,
                found: fields.len(),
            });
        }

        let mut coefficients = Vec::with_capacity(tnp);
        for i in 0..tnp {
            coefficients.push(parse_field(line, 5 + i, fields[4 + i])?);
        }
        let ratios = match parameterization {
            Parameterization::Layered => {
                let mut ratios = Vec::with_capacity(tnp);
                for i in 0..tnp {
                    ratios.push(parse_field(line, 5 + tnp + i, fields[4 + tnp + i])?);
                }
                Some(ratios)
            }
            _ => None,
        };
        let vp_vs: f64 = parse_field(line, fields.len(), fields[fields.len() - 1])?;

        model
            .configure_group(
                id,
                parameterization,
                thickness,
                vp_vs,
                &coefficients,
                ratios.as_deref(),
            )
            .map_err(|source| ModelLoadError::Config { line, source })?;
    }
    Ok(model)
}

fn parse_field<T: FromStr>(line: usize, field: usize, token: &str) -> Result<T, ModelLoadError> {
    token.parse::<T>().map_err(|_| ModelLoadError::ParseField {
        line,
        field,
        token: token.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_spec(name: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("mcinv-param-test-reader");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_reads_three_group_model() {
        let path = write_spec(
            "mod.txt",
            "0 1 2.0 2 1.0 1.2 0.5 0.5 2.0\n\
             1 2 33.0 4 3.3 3.5 3.6 3.8 1.75\n\
             2 2 165.0 5 4.3 4.4 4.4 4.5 4.6 1.75\n",
        );
        let model = load_model_txt(&path).unwrap();
        assert_eq!(model.group_count(), 3);
        assert_eq!(model.group(0).parameterization(), Parameterization::Layered);
        assert_eq!(model.group(0).layer_ratios(), &[0.5, 0.5]);
        assert_eq!(model.group(1).parameterization(), Parameterization::BSpline);
        assert_eq!(model.group(1).thickness(), 33.0);
        assert_eq!(model.group(2).control_point_count(), 5);
        assert_eq!(model.group(2).vp_vs_ratio(), 1.75);
    }

    #[test]
    fn test_rejects_wrong_field_count() {
        let path = write_spec("bad_count.txt", "0 2 33.0 4 3.3 3.5 3.6 1.75\n");
        assert!(matches!(
            load_model_txt(&path),
            Err(ModelLoadError::FieldCount {
                line: 1,
                expected: 9,
                found: 8
            })
        ));
    }

    #[test]
    fn test_rejects_unknown_flag() {
        let path = write_spec("bad_flag.txt", "0 3 33.0 4 3.3 3.5 3.6 3.8 1.75\n");
        assert!(matches!(
            load_model_txt(&path),
            Err(ModelLoadError::UnknownTypeFlag { line: 1, flag: 3 })
        ));
    }

    #[test]
    fn test_rejects_water_with_extra_coefficients() {
        let path = write_spec("bad_water.txt", "0 5 1.0 2 1.5 1.6 1.75\n");
        assert!(matches!(
            load_model_txt(&path),
            Err(ModelLoadError::Config { line: 1, .. })
        ));
    }

    #[test]
    fn test_rejects_unparseable_field() {
        let path = write_spec("bad_float.txt", "0 2 thick 4 3.3 3.5 3.6 3.8 1.75\n");
        assert!(matches!(
            load_model_txt(&path),
            Err(ModelLoadError::ParseField { line: 1, field: 3, .. })
        ));
    }
}
