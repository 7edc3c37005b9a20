use std::borrow::Cow;
use std::io::{self, BufWriter, Write};

use ptree::print_config::UTF_CHARS;
use ptree::{write_tree_with, PrintConfig, Style, TreeItem};

use crate::ast::PlanNode;

impl<'a> TreeItem for &'a PlanNode {
    type Child = Self;

    fn write_self<W: Write>(&self, f: &mut W, style: &Style) -> io::Result<()> {
        write!(f, "{}", style.paint(*self))
    }

    fn children(&self) -> Cow<[Self::Child]> {
        let children: Vec<&'a PlanNode> = match *self {
            PlanNode::JoinBlock(j) => j.children.iter().collect(),
            PlanNode::UnionBlock(u) => u.branches.iter().collect(),
            PlanNode::Optional(o) => o.body.branches.iter().collect(),
            PlanNode::Service(_) | PlanNode::Triple(_) => vec![],
        };
        Cow::from(children)
    }
}

pub fn explain<W: Write>(plan: &PlanNode, output: &mut W) -> io::Result<()> {
    let config = PrintConfig {
        indent: 3,
        characters: UTF_CHARS.into(),
        ..Default::default()
    };
    write_tree_with(&plan, output, &config)
}

pub fn explain_to_string(plan: &PlanNode) -> io::Result<String> {
    let mut buf = BufWriter::new(Vec::new());
    explain(plan, &mut buf)?;

    let bytes = buf.into_inner()?;
    String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Filter, JoinBlock, Optional, Service, UnionBlock};
    use crate::test_utils::triples;

    #[test]
    fn test_explain_plan() {
        let mut age = Service::new("http://w2", triples(&["?s ex:age ?a"]));
        age.filters.push(Filter::new("?a > 3", vec!["a"]));

        let plan = PlanNode::UnionBlock(UnionBlock::new(vec![PlanNode::JoinBlock(
            JoinBlock::new(vec![
                PlanNode::Service(Service::new("http://w1", triples(&["?s ex:name ?n"]))),
                PlanNode::Optional(Optional::new(UnionBlock::new(vec![PlanNode::JoinBlock(
                    JoinBlock::new(vec![PlanNode::Service(age)]),
                )]))),
            ]),
        )]));

        let expected_result = "\
UnionBlock
└─ JoinBlock
   ├─ Service { endpoint: \"http://w1\", triples: [?s ex:name ?n] }
   └─ Optional
      └─ JoinBlock
         └─ Service { endpoint: \"http://w2\", triples: [?s ex:age ?a], filters: [FILTER(?a > 3)] }
";

        assert_eq!(expected_result, explain_to_string(&plan).unwrap());
    }
}
