use nalgebra::{Isometry2, Matrix2, Vector2};
use plotters::prelude::*;
use std::f64::consts::{FRAC_PI_2, PI, TAU};
use std::path::Path;

use crate::error::{UwbError, UwbResult};
use crate::mapping::graph::Values;
use crate::mapping::key::{PoseKey, TrajectoryId};
use crate::mapping::optimizer::Marginals;

/// n-sigma ellipse of a 2x2 position covariance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CovarianceEllipse {
    pub center: Vector2<f64>,
    /// Full length of the major axis.
    pub width: f64,
    /// Full length of the minor axis.
    pub height: f64,
    /// Orientation of the major axis in radians, in (-pi/2, pi/2].
    pub angle: f64,
}

impl CovarianceEllipse {
    pub fn from_covariance(center: Vector2<f64>, p_xy: &Matrix2<f64>, n_std: f64) -> Self {
        let eigen = p_xy.symmetric_eigen();
        let eigenvectors = eigen.eigenvectors;
        let eigenvalues = eigen.eigenvalues;

        let (major, minor, axis) = if eigenvalues.x >= eigenvalues.y {
            (eigenvalues.x, eigenvalues.y, eigenvectors.column(0))
        } else {
            (eigenvalues.y, eigenvalues.x, eigenvectors.column(1))
        };

        // eigenvalues of a near-singular covariance can come out slightly negative
        let width = 2.0 * n_std * major.max(0.0).sqrt();
        let height = 2.0 * n_std * minor.max(0.0).sqrt();

        let mut angle = f64::atan2(axis[1], axis[0]);
        if angle > FRAC_PI_2 {
            angle -= PI;
        } else if angle <= -FRAC_PI_2 {
            angle += PI;
        }

        CovarianceEllipse {
            center,
            width,
            height,
            angle,
        }
    }

    /// Closed outline with `n` segments.
    pub fn points(&self, n: usize) -> Vec<(f64, f64)> {
        let (a, b) = (0.5 * self.width, 0.5 * self.height);
        let (sin, cos) = self.angle.sin_cos();
        (0..=n)
            .map(|i| i as f64 / n as f64 * TAU) // map [0..n] -> [0..2pi]
            .map(|t| {
                let (x, y) = (a * t.cos(), b * t.sin());
                (
                    self.center.x + cos * x - sin * y,
                    self.center.y + sin * x + cos * y,
                )
            })
            .collect()
    }
}

/// Heading arrow; the head is included in the total length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadingArrow {
    pub tail: (f64, f64),
    pub shaft_end: (f64, f64),
    /// Tip followed by the two back corners.
    pub head: [(f64, f64); 3],
}

impl HeadingArrow {
    pub fn new(pose: &Isometry2<f64>, axis_len: f64) -> Self {
        let p = pose.translation.vector;
        let angle = pose.rotation.angle();
        let dir = Vector2::new(angle.cos(), angle.sin());
        let normal = Vector2::new(-dir.y, dir.x);

        let head_length = 0.25 * axis_len;
        let head_width = 0.15 * axis_len;

        let tip = p + axis_len * dir;
        let base = tip - head_length * dir;
        let left = base + 0.5 * head_width * normal;
        let right = base - 0.5 * head_width * normal;

        HeadingArrow {
            tail: (p.x, p.y),
            shaft_end: (base.x, base.y),
            head: [(tip.x, tip.y), (left.x, left.y), (right.x, right.y)],
        }
    }
}

/// Line between consecutive poses of one trajectory.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub from: PoseKey,
    pub to: PoseKey,
    pub start: (f64, f64),
    pub end: (f64, f64),
    pub color: RGBColor,
}

#[derive(Debug, Clone, Default)]
pub struct Figure {
    pub ellipses: Vec<CovarianceEllipse>,
    pub arrows: Vec<HeadingArrow>,
    pub segments: Vec<Segment>,
}

impl Figure {
    /// Square data ranges around every drawn point, which keeps the axes
    /// equally scaled on a square canvas.
    fn square_ranges(&self, padding: f64) -> (std::ops::Range<f64>, std::ops::Range<f64>) {
        let points = self
            .ellipses
            .iter()
            .flat_map(|e| e.points(36))
            .chain(self.arrows.iter().flat_map(|a| a.head.into_iter().chain([a.tail])))
            .chain(self.segments.iter().flat_map(|s| [s.start, s.end]));

        let (mut min_x, mut max_x, mut min_y, mut max_y) = (f64::MAX, f64::MIN, f64::MAX, f64::MIN);
        for (x, y) in points {
            min_x = min_x.min(x);
            max_x = max_x.max(x);
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        }
        if min_x > max_x {
            return (-1.0..1.0, -1.0..1.0);
        }

        let half = 0.5 * (max_x - min_x).max(max_y - min_y) + padding;
        let (cx, cy) = (0.5 * (min_x + max_x), 0.5 * (min_y + max_y));
        (cx - half..cx + half, cy - half..cy + half)
    }
}

#[derive(Debug, Clone)]
pub struct PlotStyle {
    /// Plotted trajectories and their colours.
    pub trajectories: Vec<(TrajectoryId, RGBColor)>,
    pub poses_per_trajectory: u32,
    pub axis_len: f64,
    pub n_std: f64,
    pub line_width: u32,
    pub size: (u32, u32),
}

impl Default for PlotStyle {
    fn default() -> Self {
        PlotStyle {
            trajectories: vec![
                (TrajectoryId(1), RED),
                (TrajectoryId(2), GREEN),
                (TrajectoryId(3), BLUE),
            ],
            poses_per_trajectory: 5,
            axis_len: 0.5,
            n_std: 1.0,
            line_width: 3,
            size: (1024, 1024),
        }
    }
}

/// Ellipse and heading per pose plus one coloured segment to each successor.
pub fn local_graphs_figure(
    values: &Values,
    marginals: &Marginals,
    style: &PlotStyle,
) -> UwbResult<Figure> {
    let mut figure = Figure::default();

    for index in 1..=style.poses_per_trajectory {
        for (id, color) in &style.trajectories {
            let key = PoseKey::new(*id, index);
            let pose = values.at(key)?;
            let cov = marginals.marginal_covariance(key)?;
            let p_xy = cov.fixed_view::<2, 2>(0, 0).clone_owned();
            let xy = pose.translation.vector;

            figure
                .ellipses
                .push(CovarianceEllipse::from_covariance(xy, &p_xy, style.n_std));
            figure.arrows.push(HeadingArrow::new(pose, style.axis_len));

            // the last pose of a chain has no successor
            if let Some(next) = values.get(key.next()) {
                let next_xy = next.translation.vector;
                figure.segments.push(Segment {
                    from: key,
                    to: key.next(),
                    start: (xy.x, xy.y),
                    end: (next_xy.x, next_xy.y),
                    color: *color,
                });
            }
        }
    }
    Ok(figure)
}

fn plot_error<E: std::error::Error>(error: E) -> UwbError {
    UwbError::Plot(error.to_string())
}

pub fn render(figure: &Figure, path: &Path, title: &str, style: &PlotStyle) -> UwbResult<()> {
    let root = BitMapBackend::new(path, style.size).into_drawing_area();
    root.fill(&WHITE).map_err(plot_error)?;

    let (x_range, y_range) = figure.square_ranges(0.5);
    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .caption(title, ("sans-serif", 30))
        .x_label_area_size(30)
        .y_label_area_size(40)
        .build_cartesian_2d(x_range, y_range)
        .map_err(plot_error)?;

    chart.configure_mesh().draw().map_err(plot_error)?;

    chart
        .draw_series(figure.segments.iter().map(|s| {
            PathElement::new(vec![s.start, s.end], s.color.stroke_width(style.line_width))
        }))
        .map_err(plot_error)?;

    chart
        .draw_series(
            figure
                .ellipses
                .iter()
                .map(|e| PathElement::new(e.points(100), BLACK.mix(0.8).stroke_width(1))),
        )
        .map_err(plot_error)?;

    chart
        .draw_series(
            figure
                .arrows
                .iter()
                .map(|a| PathElement::new(vec![a.tail, a.shaft_end], BLACK.stroke_width(2))),
        )
        .map_err(plot_error)?;

    chart
        .draw_series(
            figure
                .arrows
                .iter()
                .map(|a| Polygon::new(a.head.to_vec(), BLACK.filled())),
        )
        .map_err(plot_error)?;

    root.present().map_err(plot_error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::Matrix3;
    use std::error::Error;

    #[test]
    fn axis_aligned_ellipse() {
        let cov = Matrix2::new(4.0, 0.0, 0.0, 1.0);
        let ellipse = CovarianceEllipse::from_covariance(Vector2::new(1.0, 2.0), &cov, 1.0);
        assert_abs_diff_eq!(ellipse.width, 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(ellipse.height, 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(ellipse.angle, 0.0, epsilon = 1e-12);

        let vertical = CovarianceEllipse::from_covariance(
            Vector2::zeros(),
            &Matrix2::new(1.0, 0.0, 0.0, 9.0),
            2.0,
        );
        assert_abs_diff_eq!(vertical.width, 12.0, epsilon = 1e-12);
        assert_abs_diff_eq!(vertical.angle.abs(), FRAC_PI_2, epsilon = 1e-12);
    }

    #[test]
    fn near_singular_covariance_clamps_height() {
        // rank one, the minor eigenvalue may come out as -0.0 or -1e-17
        let cov = Matrix2::new(1.0, 1.0, 1.0, 1.0);
        let ellipse = CovarianceEllipse::from_covariance(Vector2::zeros(), &cov, 1.0);
        assert_abs_diff_eq!(ellipse.width, 2.0 * 2.0_f64.sqrt(), epsilon = 1e-9);
        assert!(ellipse.height >= 0.0);
        assert_abs_diff_eq!(ellipse.height, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(ellipse.angle, PI / 4.0, epsilon = 1e-9);

        let negative = Matrix2::new(1e-4, 0.0, 0.0, -1e-12);
        let ellipse = CovarianceEllipse::from_covariance(Vector2::zeros(), &negative, 1.0);
        assert_eq!(ellipse.height, 0.0);
        assert!(ellipse.points(10).iter().all(|(x, y)| x.is_finite() && y.is_finite()));
    }

    #[test]
    fn ellipse_outline_is_closed() {
        let ellipse = CovarianceEllipse {
            center: Vector2::new(1.0, -1.0),
            width: 2.0,
            height: 1.0,
            angle: 0.0,
        };
        let points = ellipse.points(100);
        assert_eq!(points.len(), 101);
        assert_abs_diff_eq!(points[0].0, 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(points[0].0, points[100].0, epsilon = 1e-12);
        assert_abs_diff_eq!(points[25].1, -0.5, epsilon = 1e-12);
    }

    #[test]
    fn heading_arrow_points_along_the_pose() {
        let pose = Isometry2::new(Vector2::new(1.0, 2.0), FRAC_PI_2);
        let arrow = HeadingArrow::new(&pose, 0.5);
        assert_eq!(arrow.tail, (1.0, 2.0));
        assert_abs_diff_eq!(arrow.head[0].0, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(arrow.head[0].1, 2.5, epsilon = 1e-12);
        assert_abs_diff_eq!(arrow.shaft_end.1, 2.375, epsilon = 1e-12);
        assert_abs_diff_eq!((arrow.head[1].0 - arrow.head[2].0).abs(), 0.075, epsilon = 1e-12);
    }

    fn three_chains() -> Result<(Values, Marginals), Box<dyn Error>> {
        let mut values = Values::new();
        let mut covariances = Vec::new();
        for id in 1..=3 {
            for index in 1..=5 {
                let key = PoseKey::new(TrajectoryId(id), index);
                values.insert(key, Isometry2::translation(2.0 * index as f64, id as f64))?;
                covariances.push((key, Matrix3::identity() * 0.01 * index as f64));
            }
        }
        Ok((values, covariances.into_iter().collect()))
    }

    #[test]
    fn terminal_poses_have_no_successor_segment() -> Result<(), Box<dyn Error>> {
        let (values, marginals) = three_chains()?;
        let figure = local_graphs_figure(&values, &marginals, &PlotStyle::default())?;

        assert_eq!(figure.ellipses.len(), 15);
        assert_eq!(figure.arrows.len(), 15);
        assert_eq!(figure.segments.len(), 12);

        for id in 1..=3 {
            for index in 1..=5 {
                let key = PoseKey::new(TrajectoryId(id), index);
                let outgoing = figure.segments.iter().filter(|s| s.from == key).count();
                assert_eq!(outgoing, if index < 5 { 1 } else { 0 });
            }
        }

        let g2 = figure
            .segments
            .iter()
            .find(|s| s.from == PoseKey::new(TrajectoryId(2), 1))
            .ok_or("missing G2 segment")?;
        assert_eq!(g2.color, GREEN);
        assert_eq!(g2.to, PoseKey::new(TrajectoryId(2), 2));
        assert_eq!(g2.start, (2.0, 2.0));
        assert_eq!(g2.end, (4.0, 2.0));
        Ok(())
    }

    #[test]
    fn missing_marginal_is_an_error() -> Result<(), Box<dyn Error>> {
        let (values, _) = three_chains()?;
        let result = local_graphs_figure(&values, &Marginals::default(), &PlotStyle::default());
        assert!(matches!(result, Err(UwbError::KeyNotFound(_))));
        Ok(())
    }

    #[test]
    fn square_ranges_cover_the_figure() -> Result<(), Box<dyn Error>> {
        let (values, marginals) = three_chains()?;
        let figure = local_graphs_figure(&values, &marginals, &PlotStyle::default())?;
        let (x, y) = figure.square_ranges(0.5);
        assert_abs_diff_eq!(x.end - x.start, y.end - y.start, epsilon = 1e-9);
        assert!(x.start < 2.0 && x.end > 10.0);
        assert!(y.start < 1.0 && y.end > 3.0);
        assert_eq!(Figure::default().square_ranges(0.5), (-1.0..1.0, -1.0..1.0));
        Ok(())
    }
}
