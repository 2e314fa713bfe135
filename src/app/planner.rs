use std::fmt;

/// A discovered instrumentation test, identified by its fully-qualified
/// `package.Class#method` name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredTest {
    pub package_name: String,
    pub class_name: String,
    pub method_name: String,
}

impl DiscoveredTest {
    pub fn new(
        package_name: impl Into<String>,
        class_name: impl Into<String>,
        method_name: impl Into<String>,
    ) -> Self {
        Self {
            package_name: package_name.into(),
            class_name: class_name.into(),
            method_name: method_name.into(),
        }
    }

    /// Parses `com.example.FooTest#testBar`. The class is the last
    /// dot-separated segment before `#`.
    pub fn parse(qualified: &str) -> Option<Self> {
        let (class_part, method) = qualified.split_once('#')?;
        if method.trim().is_empty() {
            return None;
        }
        let (package, class) = match class_part.rsplit_once('.') {
            Some((package, class)) => (package, class),
            None => ("", class_part),
        };
        if class.trim().is_empty() {
            return None;
        }
        Some(Self::new(package, class, method))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Package,
    Class,
    Method,
}

/// A node of the test-plan tree. Leaves are methods; internal nodes aggregate
/// their descendants for coarser-grained dispatch or reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestPlanElement {
    pub kind: NodeKind,
    pub package_name: String,
    pub class_name: String,
    pub method_name: String,
    children: Vec<TestPlanElement>,
}

impl TestPlanElement {
    fn package(package_name: &str) -> Self {
        Self {
            kind: NodeKind::Package,
            package_name: package_name.to_string(),
            class_name: String::new(),
            method_name: String::new(),
            children: Vec::new(),
        }
    }

    fn class(package_name: &str, class_name: &str) -> Self {
        Self {
            kind: NodeKind::Class,
            package_name: package_name.to_string(),
            class_name: class_name.to_string(),
            method_name: String::new(),
            children: Vec::new(),
        }
    }

    fn method(test: &DiscoveredTest) -> Self {
        Self {
            kind: NodeKind::Method,
            package_name: test.package_name.clone(),
            class_name: test.class_name.clone(),
            method_name: test.method_name.clone(),
            children: Vec::new(),
        }
    }

    pub fn children(&self) -> &[TestPlanElement] {
        &self.children
    }

    /// `package`, `package.Class` or `package.Class#method` depending on the
    /// node kind.
    pub fn qualified_name(&self) -> String {
        match self.kind {
            NodeKind::Package => self.package_name.clone(),
            NodeKind::Class => self.join_class(),
            NodeKind::Method => format!("{}#{}", self.join_class(), self.method_name),
        }
    }

    /// The value for an `am instrument -e class/-e package` argument selecting
    /// exactly this node's tests.
    pub fn instrument_argument(&self) -> (&'static str, String) {
        match self.kind {
            NodeKind::Package => ("package", self.package_name.clone()),
            _ => ("class", self.qualified_name()),
        }
    }

    fn join_class(&self) -> String {
        if self.package_name.is_empty() {
            self.class_name.clone()
        } else {
            format!("{}.{}", self.package_name, self.class_name)
        }
    }

    fn collect_methods<'a>(&'a self, out: &mut Vec<&'a TestPlanElement>) {
        if self.kind == NodeKind::Method {
            out.push(self);
            return;
        }
        for child in &self.children {
            child.collect_methods(out);
        }
    }

    /// The minimal set of descendant nodes that each represent a whole class
    /// as one reporting unit.
    fn collect_compound<'a>(&'a self, out: &mut Vec<&'a TestPlanElement>) {
        match self.kind {
            NodeKind::Class => out.push(self),
            NodeKind::Method => {}
            NodeKind::Package => {
                for child in &self.children {
                    child.collect_compound(out);
                }
            }
        }
    }
}

impl fmt::Display for TestPlanElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified_name())
    }
}

/// The package/class/method tree built from one discovered-test list, with
/// both derived views produced by the same build.
///
/// The flattened dispatch sequence and the compound reporting plan are always
/// consistent with each other because neither can be observed without the
/// other having been derived from the identical tree.
#[derive(Debug, Clone, Default)]
pub struct TestPlan {
    roots: Vec<TestPlanElement>,
    flattened: Vec<TestPlanElement>,
    compound: Vec<TestPlanElement>,
}

impl TestPlan {
    pub fn build(tests: &[DiscoveredTest]) -> Self {
        let roots = make_package_tree(tests);
        let mut flattened = Vec::new();
        let mut compound = Vec::new();
        for root in &roots {
            let mut methods = Vec::new();
            root.collect_methods(&mut methods);
            flattened.extend(methods.into_iter().cloned());
            let mut units = Vec::new();
            root.collect_compound(&mut units);
            compound.extend(units.into_iter().cloned());
        }
        Self {
            roots,
            flattened,
            compound,
        }
    }

    pub fn roots(&self) -> &[TestPlanElement] {
        &self.roots
    }

    /// Every leaf method, in discovered-list-consistent order.
    pub fn flattened(&self) -> &[TestPlanElement] {
        &self.flattened
    }

    /// One entry per class, each aggregating all of that class's methods.
    pub fn compound(&self) -> &[TestPlanElement] {
        &self.compound
    }

    pub fn is_empty(&self) -> bool {
        self.flattened.is_empty()
    }

    /// Finite, non-restartable dispatch sequence over the leaf methods.
    pub fn into_dispatch_iter(self) -> impl Iterator<Item = TestPlanElement> {
        self.flattened.into_iter()
    }
}

/// Groups a flat ordered test list into package roots holding class nodes
/// holding method leaves. First-seen order of packages and classes is kept;
/// methods stay in input order within their class.
fn make_package_tree(tests: &[DiscoveredTest]) -> Vec<TestPlanElement> {
    let mut roots: Vec<TestPlanElement> = Vec::new();
    for test in tests {
        let found_package = roots
            .iter()
            .position(|root| root.package_name == test.package_name);
        let package_index = match found_package {
            Some(index) => index,
            None => {
                roots.push(TestPlanElement::package(&test.package_name));
                roots.len() - 1
            }
        };
        let package = &mut roots[package_index];

        let found_class = package
            .children
            .iter()
            .position(|class| class.class_name == test.class_name);
        let class_index = match found_class {
            Some(index) => index,
            None => {
                package
                    .children
                    .push(TestPlanElement::class(&test.package_name, &test.class_name));
                package.children.len() - 1
            }
        };
        package.children[class_index]
            .children
            .push(TestPlanElement::method(test));
    }
    roots
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discovered(names: &[&str]) -> Vec<DiscoveredTest> {
        names
            .iter()
            .map(|name| DiscoveredTest::parse(name).expect("valid test name"))
            .collect()
    }

    #[test]
    fn parses_qualified_test_names() {
        let test = DiscoveredTest::parse("a.b.ClassX#m1").expect("parse");
        assert_eq!(test.package_name, "a.b");
        assert_eq!(test.class_name, "ClassX");
        assert_eq!(test.method_name, "m1");

        let no_package = DiscoveredTest::parse("ClassX#m1").expect("parse");
        assert_eq!(no_package.package_name, "");
        assert_eq!(no_package.class_name, "ClassX");

        assert_eq!(DiscoveredTest::parse("a.b.ClassX"), None);
        assert_eq!(DiscoveredTest::parse("a.b.ClassX#"), None);
    }

    #[test]
    fn flatten_yields_all_methods_in_input_order() {
        let plan = TestPlan::build(&discovered(&[
            "a.b.ClassX#m1",
            "a.b.ClassX#m2",
            "a.c.ClassY#m1",
        ]));

        let names: Vec<String> = plan
            .flattened()
            .iter()
            .map(TestPlanElement::qualified_name)
            .collect();
        assert_eq!(names, vec!["a.b.ClassX#m1", "a.b.ClassX#m2", "a.c.ClassY#m1"]);
    }

    #[test]
    fn compound_plan_has_one_entry_per_class() {
        let plan = TestPlan::build(&discovered(&[
            "a.b.ClassX#m1",
            "a.b.ClassX#m2",
            "a.c.ClassY#m1",
        ]));

        let names: Vec<String> = plan
            .compound()
            .iter()
            .map(TestPlanElement::qualified_name)
            .collect();
        assert_eq!(names, vec!["a.b.ClassX", "a.c.ClassY"]);

        // each compound entry aggregates all of its class's methods
        assert_eq!(plan.compound()[0].children().len(), 2);
        assert_eq!(plan.compound()[1].children().len(), 1);
    }

    #[test]
    fn both_views_come_from_the_same_build() {
        let plan = TestPlan::build(&discovered(&["a.b.ClassX#m1"]));
        assert_eq!(plan.flattened().len(), 1);
        assert_eq!(plan.compound().len(), 1);

        let empty = TestPlan::build(&[]);
        assert!(empty.is_empty());
        assert!(empty.flattened().is_empty());
        assert!(empty.compound().is_empty());
    }

    #[test]
    fn interleaved_classes_group_under_one_class_node() {
        let plan = TestPlan::build(&discovered(&[
            "a.b.ClassX#m1",
            "a.b.ClassY#m1",
            "a.b.ClassX#m2",
        ]));

        assert_eq!(plan.roots().len(), 1);
        assert_eq!(plan.compound().len(), 2);
        let names: Vec<String> = plan
            .flattened()
            .iter()
            .map(TestPlanElement::qualified_name)
            .collect();
        // methods of one class dispatch together, in input order within the class
        assert_eq!(names, vec!["a.b.ClassX#m1", "a.b.ClassX#m2", "a.b.ClassY#m1"]);
    }

    #[test]
    fn dispatch_iterator_is_finite_and_ordered() {
        let plan = TestPlan::build(&discovered(&["a.b.ClassX#m1", "a.b.ClassX#m2"]));
        let dispatched: Vec<String> = plan
            .into_dispatch_iter()
            .map(|element| element.qualified_name())
            .collect();
        assert_eq!(dispatched, vec!["a.b.ClassX#m1", "a.b.ClassX#m2"]);
    }

    #[test]
    fn instrument_arguments_select_node_scope() {
        let plan = TestPlan::build(&discovered(&["a.b.ClassX#m1"]));
        let method = &plan.flattened()[0];
        assert_eq!(
            method.instrument_argument(),
            ("class", "a.b.ClassX#m1".to_string())
        );
        let class = &plan.compound()[0];
        assert_eq!(class.instrument_argument(), ("class", "a.b.ClassX".to_string()));
        let package = &plan.roots()[0];
        assert_eq!(package.instrument_argument(), ("package", "a.b".to_string()));
    }
}
