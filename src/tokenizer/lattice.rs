// src/tokenizer/lattice.rs

/// One candidate piece of the sentence.
#[derive(Debug, Clone)]
pub struct Node {
    /// Vocabulary index of the piece.
    pub id: usize,
    /// Byte position inside the sentence.
    pub pos: usize,
    /// Byte length.
    pub length: usize,
    pub score: f64,
    prev: Option<usize>,
    backtrace_score: f64,
}

/// Every vocabulary match of a sentence, indexed by where it starts and ends.
///
/// Nodes live in a flat arena; `begin_nodes[p]` and `end_nodes[p]` hold arena
/// indices of the nodes starting and ending at byte `p`.
#[derive(Debug)]
pub struct Lattice<'a> {
    sentence: &'a str,
    nodes: Vec<Node>,
    begin_nodes: Vec<Vec<usize>>,
    end_nodes: Vec<Vec<usize>>,
}

impl<'a> Lattice<'a> {
    pub fn from(sentence: &'a str, bos_id: usize, eos_id: usize) -> Self {
        let len = sentence.len();
        const RESERVED: usize = 16;
        let mut begin_nodes = vec![Vec::with_capacity(RESERVED); len + 1];
        let mut end_nodes = vec![Vec::with_capacity(RESERVED); len + 1];

        let bos = Node {
            id: bos_id,
            pos: 0,
            length: 0,
            score: 0.0,
            prev: None,
            backtrace_score: 0.0,
        };
        let eos = Node {
            id: eos_id,
            pos: len,
            length: 0,
            score: 0.0,
            prev: None,
            backtrace_score: 0.0,
        };
        begin_nodes[len].push(1);
        end_nodes[0].push(0);

        Self {
            sentence,
            nodes: vec![bos, eos],
            begin_nodes,
            end_nodes,
        }
    }

    pub fn sentence(&self) -> &str {
        self.sentence
    }

    pub fn len(&self) -> usize {
        self.sentence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentence.is_empty()
    }

    pub fn insert(&mut self, pos: usize, length: usize, score: f64, id: usize) {
        let node_id = self.nodes.len();
        self.nodes.push(Node {
            id,
            pos,
            length,
            score,
            prev: None,
            backtrace_score: 0.0,
        });
        self.begin_nodes[pos].push(node_id);
        self.end_nodes[pos + length].push(node_id);
    }

    /// Best-scoring path from start to end, as nodes in sentence order.
    ///
    /// On equal scores the candidate inserted first wins. Returns an empty path
    /// when some position cannot be reached.
    pub fn viterbi(&mut self) -> Vec<Node> {
        let len = self.len();
        let mut pos = 0;
        while pos <= len {
            if self.begin_nodes[pos].is_empty() {
                return vec![];
            }
            for &rnode in &self.begin_nodes[pos] {
                let mut best: Option<(usize, f64)> = None;
                for &lnode in &self.end_nodes[pos] {
                    let score = self.nodes[lnode].backtrace_score + self.nodes[rnode].score;
                    if best.is_none_or(|(_, best_score)| score > best_score) {
                        best = Some((lnode, score));
                    }
                }
                match best {
                    Some((lnode, score)) => {
                        self.nodes[rnode].prev = Some(lnode);
                        self.nodes[rnode].backtrace_score = score;
                    }
                    None => return vec![],
                }
            }
            match self.sentence[pos..].chars().next() {
                Some(c) => pos += c.len_utf8(),
                None => break,
            }
        }

        let mut path = vec![];
        let mut node = self.nodes[self.begin_nodes[len][0]].prev;
        while let Some(n) = node {
            // bos has no predecessor
            if self.nodes[n].prev.is_none() {
                break;
            }
            path.push(n);
            node = self.nodes[n].prev;
        }
        path.reverse();
        path.into_iter().map(|n| self.nodes[n].clone()).collect()
    }

    pub fn piece(&self, node: &Node) -> &str {
        &self.sentence[node.pos..node.pos + node.length]
    }
}
