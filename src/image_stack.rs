use ndarray::Array2;

use crate::error::{FibreError, Result};

/// Role of one channel in a multi-channel micrograph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelRole {
	Shg,
	Pl,
	Trans,
}

impl ChannelRole {
	pub fn label(&self) -> &'static str {
		match self {
			ChannelRole::Shg => "shg",
			ChannelRole::Pl => "pl",
			ChannelRole::Trans => "trans",
		}
	}
}

/// Channel combinations the analysis accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackKind {
	Shg,
	ShgPl,
	ShgPlTrans,
}

/// An ordered set of co-registered 2-D float channels sharing one shape.
/// After preprocessing every channel holds finite values in [0, 1].
#[derive(Debug, Clone)]
pub struct ImageStack {
	pub shg: Array2<f64>,
	pub pl: Option<Array2<f64>>,
	pub trans: Option<Array2<f64>>,
}

impl ImageStack {
	pub fn new(
		shg: Array2<f64>,
		pl: Option<Array2<f64>>,
		trans: Option<Array2<f64>>,
	) -> Result<Self> {
		let stack = Self { shg, pl, trans };
		stack.verify_stack()?;
		Ok(stack)
	}

	pub fn kind(&self) -> StackKind {
		match (&self.pl, &self.trans) {
			(Some(_), Some(_)) => StackKind::ShgPlTrans,
			(Some(_), None) => StackKind::ShgPl,
			_ => StackKind::Shg,
		}
	}

	pub fn shape(&self) -> (usize, usize) {
		self.shg.dim()
	}

	/// Channels present, in (role, image) order shg, pl, trans.
	pub fn channels(&self) -> Vec<(ChannelRole, &Array2<f64>)> {
		let mut out = vec![(ChannelRole::Shg, &self.shg)];
		if let Some(pl) = &self.pl {
			out.push((ChannelRole::Pl, pl));
		}
		if let Some(trans) = &self.trans {
			out.push((ChannelRole::Trans, trans));
		}
		out
	}

	/// Shape and finiteness verification for the channel combination held.
	/// A stack with a transmission channel but no PL channel is rejected,
	/// as are shape mismatches and non-finite pixels.
	pub fn verify_stack(&self) -> Result<()> {
		if self.pl.is_none() && self.trans.is_some() {
			return Err(FibreError::InputShape(
				"a trans channel requires a pl channel".into(),
			));
		}
		let shape = self.shg.dim();
		if shape.0 == 0 || shape.1 == 0 {
			return Err(FibreError::InputShape("empty shg channel".into()));
		}
		for (role, image) in self.channels() {
			if image.dim() != shape {
				return Err(FibreError::InputShape(format!(
					"channel {} has shape {:?}, expected {:?}",
					role.label(),
					image.dim(),
					shape
				)));
			}
			if image.iter().any(|v| !v.is_finite()) {
				return Err(FibreError::InputShape(format!(
					"channel {} contains non-finite values",
					role.label()
				)));
			}
		}
		Ok(())
	}

	/// Channel used for cell-region intensity measurements.
	pub fn cell_channel(&self) -> &Array2<f64> {
		self.pl.as_ref().unwrap_or(&self.shg)
	}
}
